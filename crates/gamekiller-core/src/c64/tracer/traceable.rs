pub trait Traceable {
    /// Return a short type label (e.g., "GK", "BUS")
    fn trace_name(&self) -> &'static str;

    /// State string (whatever details matter for this component)
    fn trace_state(&self) -> Option<String>;

    fn trace(&self) -> Option<String> {
        self.trace_state()
            .map(|state| format!("{} {}", self.trace_name(), state))
    }
}
