//! # Package Source Resolution
//!
//! This module expands the shorthand identifiers users write in declarations
//! into canonical package sources, and derives package names from them.
//!
//! ## Identifier Forms
//!
//! The resolution table, first match wins:
//!
//! | Input form | Canonical source |
//! |---|---|
//! | `https://…`, `http://…`, `git://…`, `ssh://…` | identity |
//! | `gl:user/repo` | `https://gitlab.com/user/repo.git` |
//! | `bb:user/repo` | `https://bitbucket.org/user/repo.git` |
//! | `/absolute/path` | identity, marked local |
//! | `~` or `~/…` | home-expanded path, marked local |
//! | `git@host:…` | identity |
//! | `user/repo` (contains `/`, no scheme) | `https://github.com/user/repo.git` |
//! | anything else | identity |
//!
//! ## Derived Names
//!
//! The package name is the final path segment of the canonical source with
//! any `.git` suffix stripped:
//!
//! ```
//! use pack::uri::Source;
//!
//! let src: Source = "user/repo".parse().unwrap();
//! assert_eq!(src.url(), "https://github.com/user/repo.git");
//! assert_eq!(src.derived_name().unwrap().as_str(), "repo");
//! ```
//!
//! A declaration's `as=<name>` field overrides derivation; that happens in
//! [`crate::registry`], not here.

use std::fmt::Display;
use std::str::FromStr;

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::combinator::{map, rest, verify};
use nom::sequence::{preceded, separated_pair, tuple};
use nom::IResult;
use thiserror::Error;

use crate::id::{self, Name};

//================================================================================================
// Types
//================================================================================================

/// A canonical package source: either a git URL or a local filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    url: String,
    local: bool,
}

/// An error encountered while resolving a package identifier.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UriError {
    /// The identifier is empty.
    #[error("package identifier is empty")]
    Empty,
    /// A `~` form was used but no home directory could be determined.
    #[error("cannot expand '~': no home directory")]
    NoHome,
    /// The derived or requested package name is invalid.
    #[error("invalid package name: {0}")]
    BadName(#[from] id::Error),
}

//================================================================================================
// Impls
//================================================================================================

impl Source {
    /// Returns the canonical source string.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns true when the source is a local filesystem path.
    #[must_use]
    pub fn local(&self) -> bool {
        self.local
    }

    /// Derives the package name from the canonical source.
    ///
    /// The scheme, host, and `.git` suffix are stripped and the final path
    /// segment is validated as a [`Name`].
    pub fn derived_name(&self) -> Result<Name, UriError> {
        let tail = match scheme(&self.url) {
            Ok((rest, _)) => rest,
            Err(_) => scp_path(&self.url).unwrap_or(&self.url),
        };

        let tail = tail.trim_end_matches('/');
        let tail = tail.strip_suffix(".git").unwrap_or(tail);
        let segment = tail.rsplit('/').next().unwrap_or(tail);

        Ok(Name::try_from(segment)?)
    }
}

impl FromStr for Source {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(UriError::Empty);
        }

        if scheme(s).is_ok() {
            return Ok(Source {
                url: s.to_owned(),
                local: false,
            });
        }

        if let Ok((path, host)) = forge(s) {
            return Ok(Source {
                url: format!("https://{host}/{path}.git"),
                local: false,
            });
        }

        if s.starts_with('/') {
            return Ok(Source {
                url: s.to_owned(),
                local: true,
            });
        }

        if s == "~" || s.starts_with("~/") {
            let home = config::home_dir().ok_or(UriError::NoHome)?;
            let expanded = match s.strip_prefix("~/") {
                Some(rest) => home.join(rest),
                None => home,
            };
            return Ok(Source {
                url: expanded.to_string_lossy().into_owned(),
                local: true,
            });
        }

        if scp_path(s).is_some() {
            return Ok(Source {
                url: s.to_owned(),
                local: false,
            });
        }

        if s.contains('/') {
            return Ok(Source {
                url: format!("https://github.com/{}.git", s.trim_end_matches('/')),
                local: false,
            });
        }

        Ok(Source {
            url: s.to_owned(),
            local: false,
        })
    }
}

impl TryFrom<&str> for Source {
    type Error = UriError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.url.fmt(f)
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Recognizes a URL scheme prefix, returning the remainder after `://`.
fn scheme(input: &str) -> IResult<&str, &str> {
    preceded(
        alt((
            tag("https://"),
            tag("http://"),
            tag("git://"),
            tag("ssh://"),
            tag("file://"),
        )),
        rest,
    )(input)
}

/// Recognizes a forge shorthand (`gl:`/`bb:`), yielding `(path, host)`.
fn forge(input: &str) -> IResult<&str, &'static str> {
    let (path, host) = alt((
        map(tag("gl:"), |_| "gitlab.com"),
        map(tag("bb:"), |_| "bitbucket.org"),
    ))(input)?;
    let (_, path) = verify(rest, |p: &str| !p.is_empty() && !p.starts_with('/'))(path)?;
    Ok((path.trim_end_matches('/'), host))
}

/// Returns the path component of an scp-style URL (`user@host:path`), if the
/// input is one.
fn scp_path(input: &str) -> Option<&str> {
    let parsed: IResult<&str, (&str, &str)> = tuple((
        map(
            separated_pair(
                verify(nom::bytes::complete::take_until("@"), |u: &str| {
                    !u.is_empty() && !u.contains('/') && !u.contains(':')
                }),
                tag("@"),
                verify(nom::bytes::complete::take_until(":"), |h: &str| {
                    !h.is_empty() && !h.contains('/')
                }),
            ),
            |(_, host)| host,
        ),
        preceded(tag(":"), rest),
    ))(input);

    match parsed {
        Ok((_, (_, path))) => Some(path),
        Err(_) => None,
    }
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn full_urls_pass_through() {
        for url in [
            "https://github.com/user/repo.git",
            "http://example.com/x",
            "git://example.com/x",
            "ssh://git@example.com/x.git",
        ] {
            let src: Source = url.parse().unwrap();
            assert_eq!(src.url(), url);
            assert!(!src.local());
        }
    }

    #[test]
    fn forge_shorthands_expand() {
        let gl: Source = "gl:user/repo".parse().unwrap();
        assert_eq!(gl.url(), "https://gitlab.com/user/repo.git");

        let bb: Source = "bb:user/repo".parse().unwrap();
        assert_eq!(bb.url(), "https://bitbucket.org/user/repo.git");
    }

    #[test]
    fn bare_slug_defaults_to_github() {
        let src: Source = "user/repo".parse().unwrap();
        assert_eq!(src.url(), "https://github.com/user/repo.git");
        assert!(!src.local());
    }

    #[test]
    fn absolute_paths_are_local() {
        let src: Source = "/opt/plugins/fzf".parse().unwrap();
        assert_eq!(src.url(), "/opt/plugins/fzf");
        assert!(src.local());
    }

    #[test]
    #[serial]
    fn tilde_expands_against_home() {
        temp_env::with_var("HOME", Some("/home/tester"), || {
            let src: Source = "~/dev/thing".parse().unwrap();
            assert_eq!(src.url(), "/home/tester/dev/thing");
            assert!(src.local());

            let bare: Source = "~".parse().unwrap();
            assert_eq!(bare.url(), "/home/tester");
            assert!(bare.local());
        });
    }

    #[test]
    fn scp_urls_pass_through() {
        let src: Source = "git@github.com:user/repo.git".parse().unwrap();
        assert_eq!(src.url(), "git@github.com:user/repo.git");
        assert!(!src.local());
    }

    #[test]
    fn other_identifiers_pass_through() {
        let src: Source = "something-odd".parse().unwrap();
        assert_eq!(src.url(), "something-odd");
        assert!(!src.local());
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!("".parse::<Source>(), Err(UriError::Empty));
        assert_eq!("  ".parse::<Source>(), Err(UriError::Empty));
    }

    #[test]
    fn names_derive_from_the_final_segment() {
        let cases = [
            ("https://github.com/user/repo.git", "repo"),
            ("gl:user/tool", "tool"),
            ("git@github.com:user/plugin.git", "plugin"),
            ("/opt/plugins/fzf", "fzf"),
            ("user/repo", "repo"),
            ("https://example.com/deep/path/leaf/", "leaf"),
        ];
        for (input, want) in cases {
            let src: Source = input.parse().unwrap();
            assert_eq!(src.derived_name().unwrap().as_str(), want, "for {input}");
        }
    }
}
