//! Resource probes measuring CPU time and allocations of the current thread

use std::fmt::Debug;
use std::time::Duration;

/// Source of per-thread resource readings.
///
/// Readings are cumulative; a request context takes one reading when it starts
/// and one when it finishes and records the difference.
pub trait ResourceProbe: Send + Sync + Debug {
    /// Cumulative CPU time of the current thread, None when unsupported
    fn cpu_time(&self) -> Option<Duration>;

    /// Cumulative bytes allocated by the current thread, None when unsupported
    fn allocated_bytes(&self) -> Option<u64> {
        None
    }
}

/// Probe that measures nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProbe;

impl ResourceProbe for NoopProbe {
    fn cpu_time(&self) -> Option<Duration> {
        None
    }
}

/// Probe reading the CPU clock of the calling thread.
///
/// On a multi-threaded async runtime a task may resume on another worker, so
/// the measured CPU time is only exact for work that stays on one thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadCpuProbe;

impl ResourceProbe for ThreadCpuProbe {
    #[cfg(unix)]
    fn cpu_time(&self) -> Option<Duration> {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts) };
        if rc != 0 {
            return None;
        }
        let secs = u64::try_from(ts.tv_sec).ok()?;
        let nanos = u32::try_from(ts.tv_nsec).ok()?;
        Some(Duration::new(secs, nanos))
    }

    #[cfg(not(unix))]
    fn cpu_time(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_probe() {
        assert_eq!(NoopProbe.cpu_time(), None);
        assert_eq!(NoopProbe.allocated_bytes(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_thread_cpu_probe_is_monotonic() {
        let before = ThreadCpuProbe.cpu_time().expect("thread cpu clock");
        let mut acc = 0u64;
        for i in 0..200_000u64 {
            acc = acc.wrapping_mul(31).wrapping_add(i);
        }
        std::hint::black_box(acc);
        let after = ThreadCpuProbe.cpu_time().expect("thread cpu clock");
        assert!(after >= before);
    }
}
