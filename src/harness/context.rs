// EXECUTION CONTEXT
// OWNS THE COMPILED ENEMY BINARIES AND THEIR RUNNING PROCESS GROUPS FOR ONE
// CONFIGURATION. DROP KILLS EVERY GROUP AND DELETES EVERY BINARY, INCLUDING
// ON EARLY RETURN AND PANIC UNWIND.
//
// EACH ENEMY RUNS IN ITS OWN PROCESS GROUP, PINNED TO ITS CORE, WITH A
// PARENT-DEATH SIGNAL SO A KILLED TUNER NEVER LEAVES ENEMIES BEHIND.

use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::HarnessError;

const STOP_GRACE: Duration = Duration::from_millis(500);
const STOP_POLL: Duration = Duration::from_millis(50);
// LET EVERY ENEMY REACH ITS STEADY STATE BEFORE THE SUT STARTS
const STARTUP_SETTLE: Duration = Duration::from_millis(10);

// RESTRICT THE CHILD TO ONE CORE AND TIE ITS LIFETIME TO OURS
pub fn pin_to_core(cmd: &mut Command, core: usize) {
    unsafe {
        cmd.pre_exec(move || {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_SET(core, &mut set);
            if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM as libc::c_ulong);
            Ok(())
        });
    }
}

pub struct ProcGuard {
    child: Option<Child>,
    pgid: i32,
}

impl ProcGuard {
    pub fn new(child: Child) -> Self {
        let pgid = child.id() as i32;
        Self {
            child: Some(child),
            pgid,
        }
    }

    pub fn id(&self) -> i32 {
        self.pgid
    }

    // SIGINT THE GROUP, ESCALATE TO SIGKILL AFTER THE GRACE PERIOD
    pub fn stop(&mut self) {
        let mut child = match self.child.take() {
            Some(c) => c,
            None => return,
        };
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        unsafe { libc::killpg(self.pgid, libc::SIGINT); }
        let deadline = Instant::now() + STOP_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if Instant::now() >= deadline => break,
                Ok(None) => std::thread::sleep(STOP_POLL),
                Err(_) => break,
            }
        }
        unsafe { libc::killpg(self.pgid, libc::SIGKILL); }
        let _ = child.wait();
    }
}

impl Drop for ProcGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

// ONE COMPILED ENEMY: BINARY PATH AND THE CORE IT BELONGS ON
#[derive(Clone, Debug)]
pub struct EnemyBinary {
    pub core: usize,
    pub path: PathBuf,
}

pub struct ExecutionContext {
    binaries: Vec<EnemyBinary>,
    running: Vec<ProcGuard>,
}

impl ExecutionContext {
    pub fn new(binaries: Vec<EnemyBinary>) -> Self {
        Self {
            binaries,
            running: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.binaries.is_empty()
    }

    pub fn is_running(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn start(&mut self) -> Result<(), HarnessError> {
        if self.is_running() {
            return Ok(());
        }
        for bin in &self.binaries {
            let mut cmd = Command::new(&bin.path);
            cmd.process_group(0)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
            pin_to_core(&mut cmd, bin.core);
            let child = cmd.spawn().map_err(|source| HarnessError::Spawn {
                what: bin.path.display().to_string(),
                source,
            })?;
            log::debug!("ENEMY {} ON CORE {} (PGID {})", bin.path.display(), bin.core, child.id());
            self.running.push(ProcGuard::new(child));
            std::thread::sleep(STARTUP_SETTLE);
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.running.is_empty() {
            return;
        }
        log::debug!("STOPPING {} ENEMIES", self.running.len());
        for mut guard in self.running.drain(..) {
            guard.stop();
        }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.stop();
        for bin in &self.binaries {
            let _ = std::fs::remove_file(&bin.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_stops_process_group() {
        let child = Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();
        let pgid = child.id() as i32;
        let mut guard = ProcGuard::new(child);
        assert_eq!(guard.id(), pgid);
        guard.stop();
        // GROUP IS GONE
        let alive = unsafe { libc::killpg(pgid, 0) } == 0;
        assert!(!alive);
    }

    #[test]
    fn drop_removes_binaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1_enemy.out");
        std::fs::write(&path, b"").unwrap();
        {
            let ctx = ExecutionContext::new(vec![EnemyBinary { core: 1, path: path.clone() }]);
            assert!(!ctx.is_running());
        }
        assert!(!path.exists());
    }
}
