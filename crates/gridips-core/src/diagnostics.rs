//! Post-solve diagnostics for optimization runs.
//!
//! A solve that returns is not necessarily a solve that can be trusted. The
//! OPF driver and the derivative checker collect their findings here instead
//! of failing, so callers decide what is fatal for them:
//!
//! - Severity levels (Warning, Error)
//! - Categories for grouping (convergence, voltage, thermal, derivatives, ...)
//! - Optional entity references (e.g., "bus 14", "branch 3")
//! - Optional measured value and limit for limit checks
//!
//! # Example
//!
//! ```
//! use gridips_core::diagnostics::{Diagnostics, Severity};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning("convergence", "solver stopped after 100 iterations");
//! diag.add_limit_warning("voltage", "bus 4", 1.08, 1.05);
//!
//! assert_eq!(diag.warning_count(), 2);
//! assert_eq!(diag.summary(), "2 warnings");
//! ```

use serde::Serialize;

/// Severity level for diagnostic issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Result usable but suspicious
    Warning,
    /// Result should not be used as-is
    Error,
}

/// A single finding about a solve.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Grouping key (e.g., "convergence", "voltage", "thermal")
    pub category: String,
    pub message: String,
    /// Element the issue refers to (e.g., "bus 14", "branch 1-2")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Measured quantity for limit checks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Limit the measured quantity was compared against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
}

impl DiagnosticIssue {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
            value: None,
            limit: None,
        }
    }

    /// Attach the element the issue refers to.
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Attach the measured value and the limit it broke.
    pub fn with_value(mut self, value: f64, limit: f64) -> Self {
        self.value = Some(value);
        self.limit = Some(limit);
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };

        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;

        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        if let (Some(value), Some(limit)) = (self.value, self.limit) {
            write!(f, " value={:.6} limit={:.6}", value, limit)?;
        }

        Ok(())
    }
}

/// Ordered collection of findings for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw issue directly
    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    // =========================================================================
    // Warning Methods
    // =========================================================================

    pub fn add_warning(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    /// Record a limit breach; the message is derived from the numbers.
    pub fn add_limit_warning(&mut self, category: &str, entity: &str, value: f64, limit: f64) {
        let message = format!("{} limit exceeded", category);
        self.issues.push(
            DiagnosticIssue::new(Severity::Warning, category, message)
                .with_entity(entity)
                .with_value(value, limit),
        );
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn summary(&self) -> String {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match (self.warning_count(), self.error_count()) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, plural(w)),
            (0, e) => format!("{} error{}", e, plural(e)),
            (w, e) => format!("{} warning{}, {} error{}", w, plural(w), e, plural(e)),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}
