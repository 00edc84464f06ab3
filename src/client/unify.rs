//! Turning the failures of a task group into one error.
//!
//! The scoped client helper can fail in several places at once: the user's
//! body, the reader task, the closing handshake. [`unify`] picks the error
//! the caller sees and attaches the rest as context.

use crate::error::Error;

/// A failure collected from a task group, tagged with where it came from.
#[derive(Debug, Clone)]
pub enum Failure {
    /// Raised by the user's code.
    User(Error),
    /// Raised by the library's own tasks or by closing the connection.
    Internal(Error),
}

impl Failure {
    /// The wrapped error.
    #[must_use]
    pub fn error(&self) -> &Error {
        match self {
            Failure::User(err) | Failure::Internal(err) => err,
        }
    }

    /// Unwrap the error.
    #[must_use]
    pub fn into_error(self) -> Error {
        match self {
            Failure::User(err) | Failure::Internal(err) => err,
        }
    }

    fn is_user(&self) -> bool {
        matches!(self, Failure::User(_))
    }

    fn is_cancelled(&self) -> bool {
        self.error().primary().is_cancelled()
    }

    fn is_interrupted(&self) -> bool {
        self.error().primary().is_interrupted()
    }
}

/// Reduce concurrent failures to the single error reported to the caller.
///
/// - no failure: `None`;
/// - one failure: returned unchanged;
/// - only cancellations: the user failure if there is one, else a
///   cancellation;
/// - any interrupt: a fresh [`Error::Interrupted`] with every failure as
///   context;
/// - one failure besides cancellations: that failure;
/// - a user failure among other failures: the user failure, with the other
///   non-cancelled failures attached as context;
/// - anything else: [`Error::Internal`] with every failure as context.
#[must_use]
pub fn unify(failures: Vec<Failure>) -> Option<Error> {
    if failures.len() <= 1 {
        return failures.into_iter().next().map(Failure::into_error);
    }

    let (cancelled, others): (Vec<_>, Vec<_>) =
        failures.into_iter().partition(Failure::is_cancelled);

    if others.is_empty() {
        let user = cancelled.iter().position(Failure::is_user).unwrap_or(0);
        return cancelled.into_iter().nth(user).map(Failure::into_error);
    }

    if others.iter().any(Failure::is_interrupted) {
        let context = others
            .into_iter()
            .chain(cancelled)
            .map(Failure::into_error)
            .collect();
        return Some(Error::Interrupted.with_context(context));
    }

    if others.len() == 1 {
        return others.into_iter().next().map(Failure::into_error);
    }

    if let Some(pos) = others.iter().position(Failure::is_user) {
        let mut others = others;
        let user = others.remove(pos).into_error();
        let context: Vec<Error> = others.into_iter().map(Failure::into_error).collect();
        return Some(attach_deduped(user, context));
    }

    let context = others
        .into_iter()
        .chain(cancelled)
        .map(Failure::into_error)
        .collect();
    Some(Error::Internal("this should never happen".into()).with_context(context))
}

/// Attach `context` to `error`, dropping entries of the error's own prior
/// context that the new context already reports.
fn attach_deduped(error: Error, context: Vec<Error>) -> Error {
    let (primary, prior) = match error {
        Error::Context { error, context } => (*error, context),
        other => (other, Vec::new()),
    };
    let seen: Vec<String> = context.iter().map(ToString::to_string).collect();
    let mut merged = context;
    merged.extend(
        prior
            .into_iter()
            .filter(|err| !seen.contains(&err.to_string())),
    );
    primary.with_context(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CloseReason;

    fn closed(code: u16) -> Error {
        Error::ConnectionClosed(CloseReason::new(code, None))
    }

    #[test]
    fn test_no_failures() {
        assert!(unify(vec![]).is_none());
    }

    #[test]
    fn test_single_failure_unchanged() {
        let err = unify(vec![Failure::Internal(Error::ConnectionTimeout)]).unwrap();
        assert!(matches!(err, Error::ConnectionTimeout));

        let err = unify(vec![Failure::User(Error::Cancelled)]).unwrap();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_only_cancellations_prefers_user() {
        let err = unify(vec![
            Failure::Internal(Error::Cancelled),
            Failure::User(Error::Cancelled.with_context(vec![closed(1000)])),
        ])
        .unwrap();
        assert_eq!(err.context().len(), 1);

        let err = unify(vec![
            Failure::Internal(Error::Cancelled),
            Failure::Internal(Error::Cancelled),
        ])
        .unwrap();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_interrupt_wins() {
        let err = unify(vec![
            Failure::User(Error::Protocol("user".into())),
            Failure::Internal(Error::Interrupted),
            Failure::Internal(Error::Cancelled),
        ])
        .unwrap();
        assert!(err.primary().is_interrupted());
        assert_eq!(err.context().len(), 3);
    }

    #[test]
    fn test_single_non_cancellation() {
        let err = unify(vec![
            Failure::Internal(Error::Cancelled),
            Failure::Internal(closed(1006)),
            Failure::Internal(Error::Cancelled),
        ])
        .unwrap();
        assert_eq!(err.close_reason().unwrap().code(), 1006);
        assert!(err.context().is_empty());
    }

    #[test]
    fn test_user_error_with_internal_context() {
        let err = unify(vec![
            Failure::User(Error::Config("bad input".into())),
            Failure::Internal(closed(1006)),
            Failure::Internal(Error::Cancelled),
        ])
        .unwrap();
        assert!(matches!(err.primary(), Error::Config(_)));
        assert_eq!(err.context().len(), 1);
        assert_eq!(err.context()[0].close_reason().unwrap().code(), 1006);
    }

    #[test]
    fn test_user_prior_context_is_deduped() {
        let user = Error::Config("bad".into()).with_context(vec![closed(1006), closed(1011)]);
        let err = unify(vec![
            Failure::User(user),
            Failure::Internal(closed(1006)),
        ])
        .unwrap();
        assert!(matches!(err.primary(), Error::Config(_)));
        let codes: Vec<u16> = err
            .context()
            .iter()
            .map(|e| e.close_reason().unwrap().code())
            .collect();
        assert_eq!(codes, vec![1006, 1011]);
    }

    #[test]
    fn test_internal_only_is_internal_error() {
        let err = unify(vec![
            Failure::Internal(closed(1006)),
            Failure::Internal(Error::DisconnectionTimeout),
        ])
        .unwrap();
        assert!(matches!(err.primary(), Error::Internal(_)));
        assert_eq!(err.context().len(), 2);
    }
}
