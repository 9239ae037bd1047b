//! Success/failure wrapper returned by pipeline stages and scheduled targets.
//!
//! [`Outcome`] is the contract between the orchestration core and the
//! external collaborators it drives. A failure carries an ordered list of
//! messages; the first one is the headline error.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome<T> {
    Success(T),
    Failure(Vec<String>),
}

impl<T> Outcome<T> {
    pub fn success(value: T) -> Self {
        Outcome::Success(value)
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Outcome::Failure(vec![error.into()])
    }

    /// Builds a failure from several messages, keeping their order.
    ///
    /// An empty list still yields a failure with a placeholder message so
    /// that [`Outcome::error`] always has something to report.
    pub fn failures<I, S>(errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut errors: Vec<String> = errors.into_iter().map(Into::into).collect();
        if errors.is_empty() {
            errors.push("unknown error".to_string());
        }
        Outcome::Failure(errors)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    pub fn errors(&self) -> &[String] {
        match self {
            Outcome::Success(_) => &[],
            Outcome::Failure(errors) => errors,
        }
    }

    /// First error message, if this is a failure.
    pub fn error(&self) -> Option<&str> {
        self.errors().first().map(String::as_str)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(errors) => Outcome::Failure(errors),
        }
    }

    /// Converts into a std `Result`, joining failure messages with `"; "`.
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(errors) => Err(errors.join("; ")),
        }
    }
}

impl<T, E: fmt::Display> From<Result<T, E>> for Outcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(e) => Outcome::failure(e.to_string()),
        }
    }
}

impl<T> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success(_) => write!(f, "success"),
            Outcome::Failure(errors) => write!(f, "failure: {}", errors.join("; ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_failure_are_exclusive() {
        let ok: Outcome<u32> = Outcome::success(7);
        assert!(ok.is_success());
        assert!(!ok.is_failure());
        assert_eq!(ok.value(), Some(&7));
        assert!(ok.errors().is_empty());

        let err: Outcome<u32> = Outcome::failure("boom");
        assert!(err.is_failure());
        assert!(!err.is_success());
        assert_eq!(err.value(), None);
        assert_eq!(err.error(), Some("boom"));
    }

    #[test]
    fn failures_keep_order() {
        let err: Outcome<()> = Outcome::failures(["first", "second"]);
        assert_eq!(err.errors(), ["first".to_string(), "second".to_string()]);
        assert_eq!(err.error(), Some("first"));
        assert_eq!(err.into_result(), Err("first; second".to_string()));
    }

    #[test]
    fn empty_failure_list_still_fails() {
        let err: Outcome<()> = Outcome::failures(Vec::<String>::new());
        assert!(err.is_failure());
        assert_eq!(err.error(), Some("unknown error"));
    }

    #[test]
    fn from_std_result() {
        let ok: Outcome<i32> = Ok::<_, std::io::Error>(3).into();
        assert_eq!(ok, Outcome::Success(3));

        let err: Outcome<i32> = Err::<i32, _>("bad input").into();
        assert_eq!(err.error(), Some("bad input"));
    }

    #[test]
    fn map_preserves_failure() {
        let err: Outcome<i32> = Outcome::failure("nope");
        assert_eq!(err.map(|v| v * 2).error(), Some("nope"));
        assert_eq!(Outcome::success(2).map(|v| v * 2), Outcome::Success(4));
    }

    #[test]
    fn display() {
        assert_eq!(Outcome::success(()).to_string(), "success");
        assert_eq!(
            Outcome::<()>::failures(["a", "b"]).to_string(),
            "failure: a; b"
        );
    }
}
