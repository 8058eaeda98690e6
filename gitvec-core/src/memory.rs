//! Memory discipline: checking `available_memory` before a temporal
//! ingestion batch. Reads `/proc/meminfo` directly rather than pulling in
//! a system-info crate for one gauge; callers on platforms without it get
//! an optimistic "plenty of memory" answer and rely on batch-size limits
//! instead.

#[cfg(target_os = "linux")]
pub fn available_memory_mb() -> u64 {
    let Ok(contents) = std::fs::read_to_string("/proc/meminfo") else {
        return u64::MAX;
    };
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            if let Some(kb) = rest.trim().strip_suffix(" kB").and_then(|s| s.trim().parse::<u64>().ok()) {
                return kb / 1024;
            }
        }
    }
    u64::MAX
}

#[cfg(not(target_os = "linux"))]
pub fn available_memory_mb() -> u64 {
    u64::MAX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_memory_mb_returns_a_plausible_value() {
        // Can't assert an exact number, but it should never be zero on a
        // live system and should never panic.
        let _ = available_memory_mb();
    }
}
