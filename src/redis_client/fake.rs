//! In-memory [`RedisProtocolClient`] used by Checker/Healer/Orchestrator
//! tests. Every heal action mutates the fake's internal topology so that a
//! second `check_and_heal` pass over the same fake observes convergence —
//! the idempotence property in §8 is a direct assertion on the recorded
//! command log staying empty on the second call.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{RedisProtocolClient, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    MakePrimary(SocketAddr),
    MakeReplicaOf(SocketAddr, SocketAddr),
    Monitor { sentinel: SocketAddr, primary: SocketAddr, name: String, quorum: i32 },
    ResetSentinel(SocketAddr),
    SetRedisConfig(SocketAddr, Vec<String>),
    SetSentinelConfig(SocketAddr, Vec<String>),
}

#[derive(Default)]
struct State {
    primaries: std::collections::BTreeSet<SocketAddr>,
    replica_of: BTreeMap<SocketAddr, SocketAddr>,
    sentinel_monitor: BTreeMap<SocketAddr, SocketAddr>,
    sentinel_peer_count: BTreeMap<SocketAddr, i32>,
    sentinel_replica_count: BTreeMap<SocketAddr, i32>,
    commands: Vec<RecordedCommand>,
}

#[derive(Default)]
pub struct FakeRedisProtocolClient {
    state: Mutex<State>,
}

impl FakeRedisProtocolClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_primary(&self, ep: SocketAddr) {
        let mut s = self.state.lock().unwrap();
        s.primaries.insert(ep);
        s.replica_of.remove(&ep);
    }

    pub fn seed_replica_of(&self, ep: SocketAddr, primary: SocketAddr) {
        let mut s = self.state.lock().unwrap();
        s.primaries.remove(&ep);
        s.replica_of.insert(ep, primary);
    }

    pub fn seed_sentinel(&self, sentinel: SocketAddr, monitor: SocketAddr, peer_count: i32, replica_count: i32) {
        let mut s = self.state.lock().unwrap();
        s.sentinel_monitor.insert(sentinel, monitor);
        s.sentinel_peer_count.insert(sentinel, peer_count);
        s.sentinel_replica_count.insert(sentinel, replica_count);
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().unwrap().commands.clear();
    }
}

#[async_trait]
impl RedisProtocolClient for FakeRedisProtocolClient {
    async fn is_primary(&self, ep: SocketAddr) -> Result<bool> {
        Ok(self.state.lock().unwrap().primaries.contains(&ep))
    }

    async fn get_replica_of(&self, ep: SocketAddr) -> Result<String> {
        let s = self.state.lock().unwrap();
        Ok(s.replica_of.get(&ep).map(|p| p.to_string()).unwrap_or_default())
    }

    async fn make_primary(&self, ep: SocketAddr) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.primaries.insert(ep);
        s.replica_of.remove(&ep);
        s.commands.push(RecordedCommand::MakePrimary(ep));
        Ok(())
    }

    async fn make_replica_of(&self, ep: SocketAddr, primary: SocketAddr) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.primaries.remove(&ep);
        s.replica_of.insert(ep, primary);
        s.commands.push(RecordedCommand::MakeReplicaOf(ep, primary));
        Ok(())
    }

    async fn monitor(&self, sentinel: SocketAddr, primary: SocketAddr, name: &str, quorum: i32) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.sentinel_monitor.insert(sentinel, primary);
        s.commands.push(RecordedCommand::Monitor { sentinel, primary, name: name.to_string(), quorum });
        Ok(())
    }

    async fn reset_sentinel(&self, sentinel: SocketAddr, _name: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        // A reset forces rediscovery: the fake models this as the peer/replica
        // counts snapping to whatever the test subsequently seeds (callers
        // that assert post-reset convergence reseed explicitly).
        s.commands.push(RecordedCommand::ResetSentinel(sentinel));
        Ok(())
    }

    async fn sentinel_peer_count(&self, sentinel: SocketAddr, _name: &str) -> Result<i32> {
        Ok(*self.state.lock().unwrap().sentinel_peer_count.get(&sentinel).unwrap_or(&0))
    }

    async fn sentinel_replica_count(&self, sentinel: SocketAddr, _name: &str) -> Result<i32> {
        Ok(*self.state.lock().unwrap().sentinel_replica_count.get(&sentinel).unwrap_or(&0))
    }

    async fn sentinel_monitor_address(&self, sentinel: SocketAddr, _name: &str) -> Result<Option<SocketAddr>> {
        Ok(self.state.lock().unwrap().sentinel_monitor.get(&sentinel).copied())
    }

    async fn set_redis_runtime_config(&self, ep: SocketAddr, directives: &[String]) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .commands
            .push(RecordedCommand::SetRedisConfig(ep, directives.to_vec()));
        Ok(())
    }

    async fn set_sentinel_runtime_config(&self, ep: SocketAddr, _name: &str, directives: &[String]) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .commands
            .push(RecordedCommand::SetSentinelConfig(ep, directives.to_vec()));
        Ok(())
    }
}
