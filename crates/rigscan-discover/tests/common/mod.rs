//! Loopback stand-ins for miner firmware.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use rigscan_discover::shell::ShellChannel;

/// A fake device answering canned responses keyed by command string.
///
/// Commands without a canned response get an `Invalid command` error,
/// which is also how batch requests are rejected.
pub struct FakeMiner {
    pub port: u16,
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl FakeMiner {
    pub async fn spawn(responses: HashMap<&'static str, Value>) -> Self {
        let script = responses.into_iter().map(|(k, v)| (k, vec![v])).collect();
        Self::spawn_scripted(script).await
    }

    /// Each command answers with its replies in order, repeating the last.
    pub async fn spawn_scripted(script: HashMap<&'static str, Vec<Value>>) -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let responses: HashMap<&'static str, VecDeque<Value>> = script
            .into_iter()
            .map(|(k, v)| (k, VecDeque::from(v)))
            .collect();
        let responses = Arc::new(Mutex::new(responses));

        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                let responses = responses.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let n = sock.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    let request: Value = serde_json::from_slice(&buf[..n]).unwrap_or(Value::Null);
                    let command = request["command"].as_str().unwrap_or_default().to_string();
                    log.lock().unwrap().push(command.clone());

                    let reply = {
                        let mut responses = responses.lock().unwrap();
                        match responses.get_mut(command.as_str()) {
                            Some(queue) if queue.len() > 1 => queue.pop_front(),
                            Some(queue) => queue.front().cloned(),
                            None => None,
                        }
                    }
                    .unwrap_or_else(|| error_status("Invalid command"));
                    // Firmware terminates replies with a NUL byte.
                    let mut bytes = reply.to_string().into_bytes();
                    bytes.push(0);
                    let _ = sock.write_all(&bytes).await;
                });
            }
        });

        Self { port, seen }
    }

    pub fn commands(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

pub fn ok_status(msg: &str) -> Value {
    json!([{"STATUS": "S", "When": 1_600_000_000, "Code": 1, "Msg": msg, "Description": ""}])
}

pub fn error_status(msg: &str) -> Value {
    json!({"STATUS": [{"STATUS": "E", "When": 1_600_000_000, "Code": 14, "Msg": msg, "Description": ""}]})
}

/// Responses of a stock Antminer running BMMiner.
pub fn bmminer_s19j_pro() -> HashMap<&'static str, Value> {
    let devdetails = json!({
        "STATUS": ok_status("Device Details"),
        "DEVDETAILS": [{"DEVDETAILS": 0, "Name": "BTM_SOC0", "Driver": "bitmain", "Model": "Antminer S19j Pro"}],
    });
    let version = json!({
        "STATUS": ok_status("BMMiner versions"),
        "VERSION": [{"BMMiner": "1.0.0", "API": "3.1", "Type": "Antminer S19j Pro"}],
    });
    HashMap::from([
        (
            "devdetails+version",
            json!({"devdetails": [devdetails.clone()], "version": [version.clone()], "id": 1}),
        ),
        ("devdetails", devdetails),
        ("version", version),
        ("summary", json!({"STATUS": ok_status("Summary"), "SUMMARY": [{"Elapsed": 100}]})),
        ("pools", json!({"STATUS": ok_status("1 Pool(s)"), "POOLS": []})),
    ])
}

/// Responses of a Whatsminer that rejects batches.
pub fn whatsminer_m21s_v60() -> HashMap<&'static str, Value> {
    HashMap::from([
        (
            "devdetails",
            json!({
                "STATUS": ok_status("Device Details"),
                "DEVDETAILS": [{"DEVDETAILS": 0, "Name": "SM", "Driver": "bitmicro", "Model": "M21SV60"}],
            }),
        ),
        (
            "get_version",
            json!({
                "STATUS": "S",
                "Msg": {"api_ver": "whatsminer v1.3", "fw_ver": "20200917.22.REL"},
                "Description": "whatsminer v1.3",
            }),
        ),
    ])
}

/// Responses of a BOSMiner+ install that omits the model.
pub fn bosminer_plus_no_model() -> HashMap<&'static str, Value> {
    let devdetails = json!({
        "STATUS": [{"STATUS": "S", "Msg": "Device Details", "Description": "BOSminer+ 0.2.0"}],
        "DEVDETAILS": [],
    });
    let version = json!({
        "STATUS": ok_status("BOSminer+ versions"),
        "VERSION": [{"BOSminer+": "0.2.0-2b7f1a", "API": "3.7"}],
    });
    HashMap::from([(
        "devdetails+version",
        json!({"devdetails": [devdetails], "version": [version], "id": 1}),
    )])
}

/// Shell channel returning a fixed board name and counting reads.
pub struct FakeShell {
    pub board: &'static str,
    pub reads: Mutex<Vec<String>>,
}

impl FakeShell {
    pub fn new(board: &'static str) -> Self {
        Self {
            board,
            reads: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ShellChannel for FakeShell {
    async fn read_file(&self, _ip: IpAddr, path: &str) -> rigscan_discover::Result<Option<String>> {
        self.reads.lock().unwrap().push(path.to_string());
        Ok(Some(format!("{}\n", self.board)))
    }
}
