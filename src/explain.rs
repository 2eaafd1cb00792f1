//! Shared explanation seam (C15, supplemented): the pre-distillation system
//! called out to an external LLM to turn an anomaly into operator-facing
//! prose. That call is out of scope, but the seam it occupied is kept —
//! `Watchdog::AnomalyResult` and `observer::ExplanationRecord` both implement
//! `Explainable`, so a future integration can sit behind this trait without
//! touching C13/C14's detection or reconstruction logic. The default
//! `summary()` is pure template-string formatting over the structured
//! fields, no network call, grounded in the teacher's habit of exposing
//! trait seams (`exchange::traits::ExchangeClient`) ahead of needing more
//! than one implementation.

/// A structured explanation any operator-facing surface can render.
pub trait Explainable {
    fn severity_label(&self) -> &'static str;

    /// Ordered list of the factors that drove this explanation, most
    /// important first. Implementations should bound this list themselves.
    fn key_factors(&self) -> Vec<String>;

    /// Default: `[SEVERITY] factor one; factor two; ...`. Override for a
    /// richer rendering (or to route through an external summarizer).
    fn summary(&self) -> String {
        let factors = self.key_factors();
        if factors.is_empty() {
            format!("[{}]", self.severity_label())
        } else {
            format!("[{}] {}", self.severity_label(), factors.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture;
    impl Explainable for Fixture {
        fn severity_label(&self) -> &'static str {
            "HIGH"
        }
        fn key_factors(&self) -> Vec<String> {
            vec!["a".into(), "b".into()]
        }
    }

    #[test]
    fn default_summary_joins_factors_with_severity_prefix() {
        assert_eq!(Fixture.summary(), "[HIGH] a; b");
    }

    struct Empty;
    impl Explainable for Empty {
        fn severity_label(&self) -> &'static str {
            "LOW"
        }
        fn key_factors(&self) -> Vec<String> {
            Vec::new()
        }
    }

    #[test]
    fn empty_factors_render_severity_only() {
        assert_eq!(Empty.summary(), "[LOW]");
    }
}
