//! In-process bloomd stand-in for integration tests.
//!
//! Implements enough of the bloomd line protocol to exercise the client:
//! a filter is a `HashSet` of keys plus the counters `info` reports.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const DEFAULT_CAPACITY: u64 = 100_000;
const DEFAULT_PROBABILITY: f64 = 0.0001;

#[derive(Debug)]
struct Filter {
    capacity: u64,
    probability: f64,
    in_memory: bool,
    proxied: bool,
    keys: HashSet<String>,
    checks: u64,
    check_hits: u64,
    check_misses: u64,
    sets: u64,
    set_hits: u64,
    set_misses: u64,
}

impl Filter {
    fn new(capacity: u64, probability: f64, in_memory: bool) -> Self {
        Self {
            capacity,
            probability,
            in_memory,
            proxied: false,
            keys: HashSet::new(),
            checks: 0,
            check_hits: 0,
            check_misses: 0,
            sets: 0,
            set_hits: 0,
            set_misses: 0,
        }
    }

    fn size_bytes(&self) -> u64 {
        self.capacity * 3
    }

    fn check(&mut self, key: &str) -> &'static str {
        self.checks += 1;
        if self.keys.contains(key) {
            self.check_hits += 1;
            "Yes"
        } else {
            self.check_misses += 1;
            "No"
        }
    }

    fn set(&mut self, key: &str) -> &'static str {
        self.sets += 1;
        if self.keys.insert(key.to_string()) {
            self.set_hits += 1;
            "Yes"
        } else {
            self.set_misses += 1;
            "No"
        }
    }
}

type Filters = Arc<Mutex<BTreeMap<String, Filter>>>;

/// A running fake server.
pub struct FakeBloomd {
    pub addr: String,
    filters: Filters,
    kill: broadcast::Sender<()>,
    accepted: Arc<AtomicUsize>,
    listener: JoinHandle<()>,
}

impl FakeBloomd {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let filters: Filters = Arc::new(Mutex::new(BTreeMap::new()));
        let (kill, _) = broadcast::channel(4);
        let accepted = Arc::new(AtomicUsize::new(0));

        let task = {
            let filters = Arc::clone(&filters);
            let kill = kill.clone();
            let accepted = Arc::clone(&accepted);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(stream, Arc::clone(&filters), kill.subscribe()));
                }
            })
        };

        Self {
            addr,
            filters,
            kill,
            accepted,
            listener: task,
        }
    }

    /// Number of connections accepted so far.
    pub fn connections_accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Closes every open connection; new ones are still accepted.
    pub fn drop_connections(&self) {
        let _ = self.kill.send(());
    }

    /// Number of keys currently in `name`, if it exists.
    pub fn filter_size(&self, name: &str) -> Option<usize> {
        self.filters.lock().unwrap().get(name).map(|f| f.keys.len())
    }
}

impl Drop for FakeBloomd {
    fn drop(&mut self) {
        self.listener.abort();
        let _ = self.kill.send(());
    }
}

async fn serve(stream: TcpStream, filters: Filters, mut kill: broadcast::Receiver<()>) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    loop {
        tokio::select! {
            _ = kill.recv() => return,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let reply = handle(&filters, line.trim_end());
                    if write.write_all(reply.as_bytes()).await.is_err() {
                        return;
                    }
                }
                _ => return,
            }
        }
    }
}

fn handle(filters: &Filters, line: &str) -> String {
    let mut filters = filters.lock().unwrap();
    let parts: Vec<&str> = line.split(' ').collect();

    match parts.as_slice() {
        ["list"] => list(&filters, ""),
        ["list", prefix] => list(&filters, prefix),
        ["create", name, options @ ..] => {
            if filters.contains_key(*name) {
                return reply("Exists");
            }
            let mut filter = Filter::new(DEFAULT_CAPACITY, DEFAULT_PROBABILITY, false);
            for option in options {
                match option.split_once('=') {
                    Some(("capacity", v)) => filter.capacity = v.parse().unwrap(),
                    Some(("prob", v)) => filter.probability = v.parse().unwrap(),
                    Some(("in_memory", v)) => filter.in_memory = v == "1",
                    _ => return reply("Client Error: Bad arguments"),
                }
            }
            filters.insert(name.to_string(), filter);
            reply("Done")
        }
        ["drop", name] => match filters.remove(*name) {
            Some(_) => reply("Done"),
            None => reply("Filter does not exist"),
        },
        ["close", name] => match filters.get_mut(*name) {
            Some(filter) => {
                filter.proxied = true;
                reply("Done")
            }
            None => reply("Filter does not exist"),
        },
        ["flush", name] => match filters.contains_key(*name) {
            true => reply("Done"),
            false => reply("Filter does not exist"),
        },
        ["clear", name] => match filters.get(*name).map(|f| f.proxied) {
            Some(true) => {
                filters.remove(*name);
                reply("Done")
            }
            Some(false) => reply("Filter is not proxied. Close it first."),
            None => reply("Filter does not exist"),
        },
        ["c" | "m", name, keys @ ..] if !keys.is_empty() => match filters.get_mut(*name) {
            Some(filter) => {
                filter.proxied = false;
                let states: Vec<_> = keys.iter().map(|k| filter.check(k)).collect();
                reply(&states.join(" "))
            }
            None => reply("Filter does not exist"),
        },
        ["s" | "b", name, keys @ ..] if !keys.is_empty() => match filters.get_mut(*name) {
            Some(filter) => {
                filter.proxied = false;
                let states: Vec<_> = keys.iter().map(|k| filter.set(k)).collect();
                reply(&states.join(" "))
            }
            None => reply("Filter does not exist"),
        },
        ["info", name] => match filters.get(*name) {
            Some(filter) => info(filter),
            None => reply("Filter does not exist"),
        },
        _ => reply("Client Error: Command not supported"),
    }
}

fn reply(line: &str) -> String {
    format!("{}\n", line)
}

fn list(filters: &BTreeMap<String, Filter>, prefix: &str) -> String {
    let mut out = String::from("START\n");
    for (name, filter) in filters.iter().filter(|(name, _)| name.starts_with(prefix)) {
        out.push_str(&format!(
            "{} {:.6} {} {} {}\n",
            name,
            filter.probability,
            filter.size_bytes(),
            filter.capacity,
            filter.keys.len()
        ));
    }
    out.push_str("END\n");
    out
}

fn info(filter: &Filter) -> String {
    let mut out = String::from("START\n");
    out.push_str(&format!("capacity {}\n", filter.capacity));
    out.push_str(&format!("checks {}\n", filter.checks));
    out.push_str(&format!("check_hits {}\n", filter.check_hits));
    out.push_str(&format!("check_misses {}\n", filter.check_misses));
    out.push_str(&format!("in_memory {}\n", u8::from(filter.in_memory)));
    out.push_str("page_ins 0\n");
    out.push_str("page_outs 0\n");
    out.push_str(&format!("probability {:.6}\n", filter.probability));
    out.push_str(&format!("sets {}\n", filter.sets));
    out.push_str(&format!("set_hits {}\n", filter.set_hits));
    out.push_str(&format!("set_misses {}\n", filter.set_misses));
    out.push_str(&format!("size {}\n", filter.keys.len()));
    out.push_str(&format!("storage {}\n", filter.size_bytes()));
    out.push_str("END\n");
    out
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
