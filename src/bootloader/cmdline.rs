// CLASSIFICATION: COMMUNITY
// Filename: cmdline.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Kernel and module command-line serialization.
//!
//! Arguments are joined with single spaces into a caller-owned buffer and
//! NUL-terminated.  An argument that does not fit is dropped whole, along
//! with everything after it.  The finished line goes through a
//! [`Verifier`] before it is handed back.

use thiserror::Error;

/// What a command line is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifyKind {
    /// Kernel command line.
    KernelCmdline,
    /// Module command line.
    ModuleCmdline,
    /// Loader command.
    Command,
}

/// Rejection from a [`Verifier`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?} rejected: {reason}")]
pub struct VerifyError {
    /// Kind that was being verified.
    pub kind: VerifyKind,
    /// Verifier's explanation.
    pub reason: String,
}

/// Serialization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CmdlineError {
    /// The output buffer cannot hold even the terminator.
    #[error("command-line buffer has no room for a terminator")]
    NoCapacity,
    /// The verifier refused the assembled line.
    #[error(transparent)]
    Verification(#[from] VerifyError),
}

/// Policy check applied to every assembled command line.
pub trait Verifier {
    /// Accept or reject `line` (terminator excluded).
    fn verify_string(&self, line: &[u8], kind: VerifyKind) -> Result<(), VerifyError>;
}

impl<T> Verifier for T
where
    T: Fn(&[u8], VerifyKind) -> Result<(), VerifyError>,
{
    fn verify_string(&self, line: &[u8], kind: VerifyKind) -> Result<(), VerifyError> {
        self(line, kind)
    }
}

/// Verifier that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Verifier for AcceptAll {
    fn verify_string(&self, _line: &[u8], _kind: VerifyKind) -> Result<(), VerifyError> {
        Ok(())
    }
}

/// Buffer size that holds `args` in full, terminator included.
pub fn cmdline_size<S: AsRef<str>>(args: &[S]) -> usize {
    if args.is_empty() {
        return 1;
    }
    args.iter().map(|arg| arg.as_ref().len() + 1).sum()
}

/// Serialize `args` into `out` and verify the result.
///
/// Returns the number of bytes before the terminator.
pub fn build_cmdline<S, V>(
    args: &[S],
    out: &mut [u8],
    kind: VerifyKind,
    verifier: &V,
) -> Result<usize, CmdlineError>
where
    S: AsRef<str>,
    V: Verifier + ?Sized,
{
    if out.is_empty() {
        return Err(CmdlineError::NoCapacity);
    }
    let mut pos = 0;
    for arg in args {
        let arg = arg.as_ref().as_bytes();
        if pos + arg.len() + 1 > out.len() {
            break;
        }
        out[pos..pos + arg.len()].copy_from_slice(arg);
        out[pos + arg.len()] = b' ';
        pos += arg.len() + 1;
    }
    // The trailing space becomes the terminator.
    pos = pos.saturating_sub(1);
    out[pos] = 0;

    verifier.verify_string(&out[..pos], kind)?;
    Ok(pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_counts_separators_and_terminator() {
        assert_eq!(cmdline_size(&["aaaa", "bb"]), 8);
        assert_eq!(cmdline_size::<&str>(&[]), 1);
    }

    #[test]
    fn fitting_arguments_are_space_separated() {
        let args = ["console=hvc0", "quiet"];
        let mut out = vec![0xffu8; cmdline_size(&args)];
        let n = build_cmdline(&args, &mut out, VerifyKind::KernelCmdline, &AcceptAll).unwrap();
        assert_eq!(&out[..=n], b"console=hvc0 quiet\0");
    }

    #[test]
    fn argument_that_does_not_fit_is_dropped_whole() {
        let mut out = [0xffu8; 7];
        let n = build_cmdline(
            &["aaaa", "bbbb", "cccc"],
            &mut out,
            VerifyKind::KernelCmdline,
            &AcceptAll,
        )
        .unwrap();
        assert_eq!(n, 4);
        assert_eq!(&out[..5], b"aaaa\0");
    }

    #[test]
    fn empty_list_writes_only_terminator() {
        let mut out = [0xffu8; 4];
        let n = build_cmdline::<&str, _>(&[], &mut out, VerifyKind::Command, &AcceptAll).unwrap();
        assert_eq!(n, 0);
        assert_eq!(out[0], 0);
    }

    #[test]
    fn zero_capacity_is_an_error() {
        let mut out: [u8; 0] = [];
        assert_eq!(
            build_cmdline(&["a"], &mut out, VerifyKind::Command, &AcceptAll),
            Err(CmdlineError::NoCapacity)
        );
    }

    #[test]
    fn verifier_sees_kind_and_can_reject() {
        let reject_modules = |line: &[u8], kind: VerifyKind| {
            if kind == VerifyKind::ModuleCmdline {
                Err(VerifyError {
                    kind,
                    reason: format!("unsigned: {}", String::from_utf8_lossy(line)),
                })
            } else {
                Ok(())
            }
        };
        let mut out = [0u8; 16];
        assert!(build_cmdline(&["x"], &mut out, VerifyKind::KernelCmdline, &reject_modules).is_ok());
        let err = build_cmdline(&["x"], &mut out, VerifyKind::ModuleCmdline, &reject_modules)
            .unwrap_err();
        assert!(matches!(err, CmdlineError::Verification(VerifyError { reason, .. }) if reason == "unsigned: x"));
    }
}
