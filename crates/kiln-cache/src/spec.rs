//! Cache spec parsing.
//!
//! A spec is a list of tokens. A token is either an absolute local path or a
//! remote mirror group: one or more URLs joined by `|`, all of the same
//! backend family (`s3://bucket/prefix`, `http://host/path`,
//! `https://host/path`).

use crate::remote::RemoteKind;
use kiln_core::{Error, Result};
use std::path::{Path, PathBuf};
use url::Url;

const REMOTE_SCHEMES: [&str; 3] = ["s3://", "http://", "https://"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Local,
    Remote,
}

fn sniff(token: &str) -> Shape {
    if REMOTE_SCHEMES.iter().any(|scheme| token.starts_with(scheme)) {
        Shape::Remote
    } else {
        Shape::Local
    }
}

/// An ordered group of interchangeable remote endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    kind: RemoteKind,
    urls: Vec<Url>,
}

impl RemoteSpec {
    pub fn parse(token: &str) -> Result<Self> {
        let mut kind = None;
        let mut urls = Vec::new();
        for part in token.split('|').map(str::trim) {
            if part.is_empty() {
                return Err(Error::spec_format(token, "empty URL in mirror group"));
            }
            let url = Url::parse(part)
                .map_err(|e| Error::spec_format(token, format!("{}: {}", part, e)))?;
            let part_kind = RemoteKind::from_scheme(url.scheme()).ok_or_else(|| {
                Error::spec_format(token, format!("unsupported scheme {:?}", url.scheme()))
            })?;
            if url.host_str().is_none_or(str::is_empty) {
                return Err(Error::spec_format(token, format!("{} has no host", part)));
            }
            match kind {
                None => kind = Some(part_kind),
                Some(k) if k != part_kind => {
                    return Err(Error::spec_format(
                        token,
                        format!("mirror group mixes {} and {} endpoints", k, part_kind),
                    ));
                }
                Some(_) => {}
            }
            urls.push(url);
        }

        match kind {
            Some(kind) => Ok(Self { kind, urls }),
            None => Err(Error::spec_format(token, "empty mirror group")),
        }
    }

    pub fn kind(&self) -> RemoteKind {
        self.kind
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    /// Key prefix for a URL of this group: its path without surrounding
    /// slashes.
    pub fn prefix_of(url: &Url) -> String {
        url.path().trim_matches('/').to_string()
    }
}

/// A validated tier composition: at most one local cache directory and at
/// most one remote mirror group, and at least one of the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSpec {
    local: Option<PathBuf>,
    remote: Option<RemoteSpec>,
}

impl CacheSpec {
    /// Parse a token list. Two tokens are read positionally as
    /// `[local, remote]`; a single token is classified by its shape.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self> {
        let tokens: Vec<&str> = tokens
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .collect();

        match tokens.as_slice() {
            [] => Err(Error::CacheSpecEmpty),
            [token] => match sniff(token) {
                Shape::Local => Self::new(Some(parse_local(token)?), None),
                Shape::Remote => Self::new(None, Some(RemoteSpec::parse(token)?)),
            },
            [local, remote] => {
                if sniff(local) != Shape::Local {
                    return Err(Error::spec_format(
                        *local,
                        "expected a local path in first position, found a remote URL",
                    ));
                }
                if sniff(remote) != Shape::Remote {
                    return Err(Error::spec_format(
                        *remote,
                        "expected a remote URL in second position, found a local path",
                    ));
                }
                Self::new(Some(parse_local(local)?), Some(RemoteSpec::parse(remote)?))
            }
            many => {
                let locals = many.iter().filter(|t| sniff(t) == Shape::Local).count();
                if locals > 1 {
                    Err(Error::TooManyLocalSpecs(locals))
                } else {
                    Err(Error::TooManyRemoteSpecs(many.len() - locals))
                }
            }
        }
    }

    /// Build a spec from separately keyed lists, such as a config file's
    /// `local` and `remote` entries.
    pub fn from_parts<S: AsRef<str>>(locals: &[S], remotes: &[S]) -> Result<Self> {
        if locals.len() > 1 {
            return Err(Error::TooManyLocalSpecs(locals.len()));
        }
        if remotes.len() > 1 {
            return Err(Error::TooManyRemoteSpecs(remotes.len()));
        }

        let local = match locals.first().map(|t| t.as_ref().trim()) {
            Some(token) if sniff(token) == Shape::Remote => {
                return Err(Error::spec_format(token, "expected a local path, found a remote URL"));
            }
            Some(token) => Some(parse_local(token)?),
            None => None,
        };
        let remote = match remotes.first().map(|t| t.as_ref().trim()) {
            Some(token) if sniff(token) == Shape::Local => {
                return Err(Error::spec_format(token, "expected a remote URL, found a local path"));
            }
            Some(token) => Some(RemoteSpec::parse(token)?),
            None => None,
        };
        Self::new(local, remote)
    }

    fn new(local: Option<PathBuf>, remote: Option<RemoteSpec>) -> Result<Self> {
        if local.is_none() && remote.is_none() {
            return Err(Error::CacheSpecEmpty);
        }
        Ok(Self { local, remote })
    }

    pub fn local(&self) -> Option<&Path> {
        self.local.as_deref()
    }

    pub fn remote(&self) -> Option<&RemoteSpec> {
        self.remote.as_ref()
    }
}

fn parse_local(token: &str) -> Result<PathBuf> {
    let path = Path::new(token);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Err(Error::spec_format(token, "local cache path must be absolute"))
    }
}
