/// A destructive action waiting for explicit confirmation.
///
/// Holds at most one target. A new [`request`](Self::request) replaces the
/// previous one, so only the most recent intent can ever be confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation<T> {
    pending: Option<T>,
}

impl<T> Default for Confirmation<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> Confirmation<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `target`, returning the intent it replaced.
    pub fn request(&mut self, target: T) -> Option<T> {
        self.pending.replace(target)
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Run `action` on the pending target and clear it. Returns `None`
    /// without calling `action` when nothing is pending.
    pub fn confirm<R>(&mut self, action: impl FnOnce(T) -> R) -> Option<R> {
        self.pending.take().map(action)
    }

    pub fn take(&mut self) -> Option<T> {
        self.pending.take()
    }

    /// Drop the pending target. Returns whether there was one.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_request_wins() {
        let mut confirmation = Confirmation::new();
        assert_eq!(confirmation.request("t1"), None);
        assert_eq!(confirmation.request("t2"), Some("t1"));

        let mut confirmed = Vec::new();
        confirmation.confirm(|t| confirmed.push(t));
        assert_eq!(confirmed, ["t2"]);
        assert!(!confirmation.is_pending());
    }

    #[test]
    fn confirm_runs_at_most_once() {
        let mut confirmation = Confirmation::new();
        confirmation.request(1);
        let mut runs = 0;
        confirmation.confirm(|_| runs += 1);
        confirmation.confirm(|_| runs += 1);
        assert_eq!(runs, 1);
    }

    #[test]
    fn cancel_discards_without_running() {
        let mut confirmation = Confirmation::new();
        confirmation.request("t1");
        assert!(confirmation.cancel());
        assert!(!confirmation.cancel());
        assert_eq!(confirmation.confirm(|t| t), None);
    }
}
