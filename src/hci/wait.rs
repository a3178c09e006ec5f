use embassy_time::Instant;

/// Outcome of [`poll_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Wait<T> {
    Matched(T),
    TimedOut,
}

/// Call `poll` until it yields a value or `deadline` passes.
///
/// `poll` runs at least once, even with a deadline already in the past.
/// This is a busy loop: it occupies the calling context until it returns.
pub fn poll_until<T, E>(
    deadline: Instant,
    mut poll: impl FnMut() -> Result<Option<T>, E>,
) -> Result<Wait<T>, E> {
    loop {
        if let Some(value) = poll()? {
            return Ok(Wait::Matched(value));
        }
        if Instant::now() >= deadline {
            return Ok(Wait::TimedOut);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::Duration;

    #[test]
    fn matches_before_deadline() {
        let mut calls = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        let out: Result<_, ()> = poll_until(deadline, || {
            calls += 1;
            Ok((calls == 3).then_some(calls))
        });
        assert_eq!(out, Ok(Wait::Matched(3)));
    }

    #[test]
    fn expired_deadline_still_polls_once() {
        let mut calls = 0;
        let out: Result<Wait<()>, ()> = poll_until(Instant::from_ticks(0), || {
            calls += 1;
            Ok(None)
        });
        assert_eq!(out, Ok(Wait::TimedOut));
        assert_eq!(calls, 1);
    }

    #[test]
    fn errors_short_circuit() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let out: Result<Wait<()>, &str> = poll_until(deadline, || Err("bus"));
        assert_eq!(out, Err("bus"));
    }
}
