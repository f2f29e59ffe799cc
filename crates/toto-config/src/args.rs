//! Command-line preprocessing ahead of the layered loader.

use std::ffi::OsString;

/// Long flags whose value may be a negative integer.
const SIGNED_FLAGS: &[&str] = &["--processes"];

/// Rewrites `--processes -1` as `--processes=-1`.
///
/// The generated parser reads a detached `-1` as an unknown short flag; the
/// joined form is unambiguous. Other arguments pass through untouched.
pub fn join_negative_values<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut joined = Vec::new();
    let mut args = args.into_iter().map(Into::into).peekable();
    while let Some(arg) = args.next() {
        let flag = arg
            .to_str()
            .filter(|flag| SIGNED_FLAGS.contains(flag))
            .map(str::to_owned);
        let negative = args
            .peek()
            .and_then(|next| next.to_str())
            .filter(|value| is_negative_integer(value))
            .map(str::to_owned);
        match (flag, negative) {
            (Some(flag), Some(value)) => {
                args.next();
                joined.push(OsString::from(format!("{flag}={value}")));
            }
            _ => joined.push(arg),
        }
    }
    joined
}

fn is_negative_integer(value: &str) -> bool {
    value
        .strip_prefix('-')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(&["toto", "--processes", "-1"], &["toto", "--processes=-1"])]
    #[case(&["toto", "--processes", "4", "--debug"], &["toto", "--processes", "4", "--debug"])]
    #[case(&["toto", "--processes", "-d"], &["toto", "--processes", "-d"])]
    #[case(&["toto", "--method-module", "-1"], &["toto", "--method-module", "-1"])]
    #[case(&["toto", "--processes"], &["toto", "--processes"])]
    fn joins_only_signed_flags_followed_by_negative_numbers(
        #[case] input: &[&str],
        #[case] expected: &[&str],
    ) {
        let expected: Vec<OsString> = expected.iter().map(OsString::from).collect();
        assert_eq!(join_negative_values(input.iter().copied()), expected);
    }
}
