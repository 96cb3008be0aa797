use std::time::{Duration, Instant};

/// Fixed back-off polling with an upper time bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub deadline: Duration,
}

impl PollSchedule {
    /// Upper bound the edge-counting helpers accept.
    pub const MAX_DEADLINE: Duration = Duration::from_secs(60);

    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    /// 100 ms back-off, deadline capped at [`PollSchedule::MAX_DEADLINE`].
    pub fn with_deadline(deadline: Duration) -> Self {
        Self::new(Duration::from_millis(100), deadline.min(Self::MAX_DEADLINE))
    }
}

/// Call `attempt` until it yields a value or the deadline passes.
///
/// Errors from `attempt` end polling immediately. Running out of time is
/// not an error: it yields `Ok(None)`.
pub fn poll_until<T, E>(
    schedule: PollSchedule,
    mut attempt: impl FnMut() -> Result<Option<T>, E>,
) -> Result<Option<T>, E> {
    let start = Instant::now();
    while start.elapsed() < schedule.deadline {
        if let Some(value) = attempt()? {
            return Ok(Some(value));
        }
        std::thread::sleep(schedule.interval);
    }
    log::debug!("Polling gave up after {:?}", schedule.deadline);
    Ok(None)
}
