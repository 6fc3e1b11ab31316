#[path = "adversarial/tamper.rs"]
mod tamper;

#[path = "adversarial/fail_closed.rs"]
mod fail_closed;

#[path = "adversarial/collapse_bypass.rs"]
mod collapse_bypass;
