use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Local, TimeZone};
use log::debug;
use nix::unistd::{Uid as NixUid, User};
use sysinfo::{
    MemoryRefreshKind, Pid, ProcessRefreshKind, ProcessStatus, RefreshKind, System,
};

/// Interval the focused process gets between its priming refresh and the
/// full enumeration, so its CPU reading covers a real measurement window.
const CPU_PRIME_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Sleeping,
    Stopped,
    Zombie,
    Idle,
    Dead,
    Tracing,
    DiskSleep,
    Locked,
    Waking,
    Parked,
    Unknown,
}

impl From<ProcessStatus> for ProcessState {
    fn from(status: ProcessStatus) -> Self {
        match status {
            ProcessStatus::Run => ProcessState::Running,
            ProcessStatus::Sleep => ProcessState::Sleeping,
            ProcessStatus::Stop => ProcessState::Stopped,
            ProcessStatus::Zombie => ProcessState::Zombie,
            ProcessStatus::Idle => ProcessState::Idle,
            ProcessStatus::Dead => ProcessState::Dead,
            ProcessStatus::Tracing => ProcessState::Tracing,
            ProcessStatus::UninterruptibleDiskSleep => ProcessState::DiskSleep,
            ProcessStatus::LockBlocked => ProcessState::Locked,
            ProcessStatus::Waking | ProcessStatus::Wakekill => ProcessState::Waking,
            ProcessStatus::Parked => ProcessState::Parked,
            ProcessStatus::Unknown(_) => ProcessState::Unknown,
        }
    }
}

impl ProcessState {
    pub fn label(self) -> &'static str {
        match self {
            ProcessState::Running => "running",
            ProcessState::Sleeping => "sleeping",
            ProcessState::Stopped => "stopped",
            ProcessState::Zombie => "zombie",
            ProcessState::Idle => "idle",
            ProcessState::Dead => "dead",
            ProcessState::Tracing => "tracing",
            ProcessState::DiskSleep => "disk sleep",
            ProcessState::Locked => "locked",
            ProcessState::Waking => "waking",
            ProcessState::Parked => "parked",
            ProcessState::Unknown => "unknown",
        }
    }
}

/// One process as captured in a snapshot.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub mem_percent: f32,
    pub state: ProcessState,
    pub started_at: Option<DateTime<Local>>,
    pub owner: String,
}

/// A point-in-time capture of all readable processes. Immutable once built.
#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    pub records: Vec<ProcessRecord>,
}

impl ProcessSnapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Process enumeration facility. The production implementation wraps
/// sysinfo; tests substitute scripted samplers.
pub trait Sampler {
    /// Capture a snapshot of all live processes. `prime` names the pid the
    /// user has focused; it is refreshed ahead of the full enumeration so
    /// its CPU percentage is measured over a real interval. Individual
    /// unreadable processes are skipped; the call fails only when the
    /// enumeration facility itself is unavailable.
    fn sample(&mut self, prime: Option<u32>) -> Result<ProcessSnapshot>;
}

pub struct SystemSampler {
    system: System,
    username_cache: HashMap<u32, String>,
    process_refresh: ProcessRefreshKind,
}

impl SystemSampler {
    pub fn new() -> Self {
        let process_refresh = ProcessRefreshKind::everything();
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_processes(process_refresh)
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            system,
            username_cache: HashMap::new(),
            process_refresh,
        }
    }

    fn username_from_uid(&mut self, uid: u32) -> String {
        if let Some(name) = self.username_cache.get(&uid) {
            return name.clone();
        }

        let name = User::from_uid(NixUid::from_raw(uid))
            .ok()
            .flatten()
            .map(|user| user.name)
            .unwrap_or_else(|| uid.to_string());

        self.username_cache.insert(uid, name.clone());
        name
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SystemSampler {
    fn sample(&mut self, prime: Option<u32>) -> Result<ProcessSnapshot> {
        if let Some(pid) = prime {
            // Prime the focused process and give it a measurement window
            // before the full pass.
            if self
                .system
                .refresh_process_specifics(Pid::from_u32(pid), self.process_refresh)
            {
                thread::sleep(CPU_PRIME_INTERVAL);
            }
        }

        self.system.refresh_memory();
        self.system
            .refresh_processes_specifics(self.process_refresh);

        let total_memory = self.system.total_memory();
        if self.system.processes().is_empty() {
            bail!("process enumeration returned nothing; is /proc mounted?");
        }

        let pids: Vec<Pid> = self.system.processes().keys().copied().collect();
        let mut records = Vec::with_capacity(pids.len());
        let mut skipped = 0usize;

        for pid in pids {
            let Some(process) = self.system.process(pid) else {
                // Vanished between enumeration and read. Normal race.
                skipped += 1;
                continue;
            };

            let Some(uid) = process.user_id().map(|uid| raw_uid(uid)) else {
                // Ownerless entries (kernel threads, denied stat reads)
                // are excluded rather than reported half-filled.
                skipped += 1;
                continue;
            };

            let name = process.name().to_string();
            if name.is_empty() {
                skipped += 1;
                continue;
            }

            let cpu_percent = normalize_cpu(process.cpu_usage());
            let mem_percent = memory_percent(process.memory(), total_memory);
            let state = ProcessState::from(process.status());
            let started_at = started_at(process.start_time());
            let owner = self.username_from_uid(uid);

            records.push(ProcessRecord {
                pid: pid.as_u32(),
                name,
                cpu_percent,
                mem_percent,
                state,
                started_at,
                owner,
            });
        }

        debug!(
            "sampled {} processes ({} skipped)",
            records.len(),
            skipped
        );
        Ok(ProcessSnapshot { records })
    }
}

fn raw_uid(uid: &sysinfo::Uid) -> u32 {
    (**uid) as u32
}

fn normalize_cpu(value: f32) -> f32 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

fn memory_percent(used: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    ((used as f64 / total as f64) * 100.0) as f32
}

fn started_at(epoch_secs: u64) -> Option<DateTime<Local>> {
    if epoch_secs == 0 {
        return None;
    }
    Local.timestamp_opt(epoch_secs as i64, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_cpu_clamps_bad_values() {
        assert_eq!(normalize_cpu(12.5), 12.5);
        assert_eq!(normalize_cpu(-3.0), 0.0);
        assert_eq!(normalize_cpu(f32::NAN), 0.0);
        assert_eq!(normalize_cpu(f32::INFINITY), 0.0);
    }

    #[test]
    fn memory_percent_handles_zero_total() {
        assert_eq!(memory_percent(512, 0), 0.0);
        let half = memory_percent(512, 1024);
        assert!((half - 50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn started_at_rejects_epoch_zero() {
        assert!(started_at(0).is_none());
        assert!(started_at(1_700_000_000).is_some());
    }

    #[test]
    fn system_sampler_sees_own_process() {
        let mut sampler = SystemSampler::new();
        let snapshot = sampler.sample(None).expect("enumeration available");
        let own = std::process::id();
        assert!(snapshot.records.iter().any(|record| record.pid == own));
    }

    #[test]
    fn system_sampler_priming_survives_dead_pid() {
        let mut sampler = SystemSampler::new();
        // A pid that cannot exist: priming must degrade to a plain sample.
        let snapshot = sampler.sample(Some(999_999_999)).expect("sample");
        assert!(!snapshot.is_empty());
    }
}
