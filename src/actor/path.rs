use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use thiserror::Error;

use crate::validate::validate_segment;

pub type ActorId = u64;

pub const LOCAL_PROTOCOL: &str = "movie";
pub const TCP_PROTOCOL: &str = "movie.tcp";

#[derive(Debug, Error)]
#[error("invalid actor path: {0}")]
pub struct InvalidPath(pub String);

/// The location half of an actor address: a protocol, a system name and,
/// for remote addresses, a host and port.
///
/// `movie://sys` is local; `movie.tcp://sys@host:port` is remote.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    pub protocol: Arc<str>,
    pub system: Arc<str>,
    pub host: Option<Arc<str>>,
    pub port: Option<u16>,
}

impl Address {
    pub fn local(system: &str) -> Address {
        Address {
            protocol: Arc::from(LOCAL_PROTOCOL),
            system: Arc::from(system),
            host: None,
            port: None,
        }
    }

    pub fn tcp(system: &str, host: &str, port: u16) -> Address {
        Address {
            protocol: Arc::from(TCP_PROTOCOL),
            system: Arc::from(system),
            host: Some(Arc::from(host)),
            port: Some(port),
        }
    }

    pub fn is_local(&self) -> bool {
        self.host.is_none()
    }

    /// `host:port` for remote addresses.
    pub fn authority(&self) -> Option<String> {
        match (&self.host, self.port) {
            (Some(h), Some(p)) => Some(format!("{}:{}", h, p)),
            _ => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.host, self.port) {
            (Some(h), Some(p)) => write!(f, "{}://{}@{}:{}", self.protocol, self.system, h, p),
            _ => write!(f, "{}://{}", self.protocol, self.system),
        }
    }
}

/// A hierarchical actor name bound to an [`Address`].
///
/// Canonical forms: `movie://sys/user/a/b` locally and
/// `movie.tcp://sys@host:9000/user/a` remotely. The root path has no
/// segments. Equality is structural over the address and segments.
#[derive(Clone, Eq)]
pub struct ActorPath {
    address: Address,
    segments: Arc<Vec<String>>,
}

impl ActorPath {
    pub fn root(address: Address) -> ActorPath {
        ActorPath {
            address,
            segments: Arc::new(Vec::new()),
        }
    }

    pub fn new(address: Address, segments: Vec<String>) -> ActorPath {
        ActorPath {
            address,
            segments: Arc::new(segments),
        }
    }

    /// Strict parse of the canonical URI grammar.
    pub fn parse(s: &str) -> Result<ActorPath, InvalidPath> {
        let err = || InvalidPath(s.to_string());

        let (protocol, rest) = s.split_once("://").ok_or_else(err)?;
        if protocol != LOCAL_PROTOCOL && protocol != TCP_PROTOCOL {
            return Err(err());
        }

        let mut parts = rest.splitn(2, '/');
        let authority = parts.next().ok_or_else(err)?;
        let path_part = parts.next();

        let address = match authority.split_once('@') {
            Some((system, host_port)) => {
                // host and port are only valid on the tcp protocol
                if protocol != TCP_PROTOCOL || system.is_empty() {
                    return Err(err());
                }
                let (host, port) = host_port.split_once(':').ok_or_else(err)?;
                if host.is_empty() {
                    return Err(err());
                }
                let port: u16 = port.parse().map_err(|_| err())?;
                Address::tcp(system, host, port)
            }
            None => {
                if protocol != LOCAL_PROTOCOL || authority.is_empty() {
                    return Err(err());
                }
                Address::local(authority)
            }
        };

        let segments = match path_part {
            None | Some("") => Vec::new(),
            Some(p) => {
                let segs: Vec<String> = p.split('/').map(|s| s.to_string()).collect();
                for seg in &segs {
                    if !validate_segment(seg) {
                        return Err(err());
                    }
                }
                segs
            }
        };

        Ok(ActorPath::new(address, segments))
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, or the empty string for the root path.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    pub fn child(&self, name: &str) -> ActorPath {
        let mut segments = (*self.segments).clone();
        segments.push(name.to_string());
        ActorPath::new(self.address.clone(), segments)
    }

    pub fn parent(&self) -> Option<ActorPath> {
        if self.segments.is_empty() {
            return None;
        }
        let mut segments = (*self.segments).clone();
        segments.pop();
        Some(ActorPath::new(self.address.clone(), segments))
    }

    /// Registry key: the segments alone, ignoring protocol, host and
    /// port, so local and remote lookups for the same logical actor
    /// agree.
    pub fn key(&self) -> String {
        let mut key = String::new();
        for seg in self.segments.iter() {
            key.push('/');
            key.push_str(seg);
        }
        if key.is_empty() {
            key.push('/');
        }
        key
    }

    /// The same logical path rendered under another address.
    pub fn with_address(&self, address: Address) -> ActorPath {
        ActorPath {
            address,
            segments: self.segments.clone(),
        }
    }
}

impl PartialEq for ActorPath {
    fn eq(&self, other: &ActorPath) -> bool {
        self.address == other.address && self.segments == other.segments
    }
}

impl Hash for ActorPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
        self.segments.hash(state);
    }
}

impl fmt::Display for ActorPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.address)?;
        for seg in self.segments.iter() {
            write!(f, "/{}", seg)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ActorPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ActorPath[{}]", self)
    }
}

/// An `ActorUri` pins a path to the actor's unique id within its system.
#[derive(Clone)]
pub struct ActorUri {
    pub uid: ActorId,
    pub name: Arc<str>,
    pub path: ActorPath,
}

impl PartialEq for ActorUri {
    fn eq(&self, other: &ActorUri) -> bool {
        self.path == other.path
    }
}

impl Eq for ActorUri {}

impl Hash for ActorUri {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Display for ActorUri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl fmt::Debug for ActorUri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ActorUri[{}#{}]", self.path, self.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_local() {
        let p = ActorPath::parse("movie://sys/user/a/b").unwrap();
        assert!(p.address().is_local());
        assert_eq!(p.segments(), ["user", "a", "b"]);
        assert_eq!(p.name(), "b");
        assert_eq!(p.to_string(), "movie://sys/user/a/b");
    }

    #[test]
    fn parse_remote() {
        let p = ActorPath::parse("movie.tcp://sys@10.0.0.1:2552/user/a").unwrap();
        assert!(!p.address().is_local());
        assert_eq!(p.address().authority().unwrap(), "10.0.0.1:2552");
        assert_eq!(p.to_string(), "movie.tcp://sys@10.0.0.1:2552/user/a");
    }

    #[test]
    fn parse_root() {
        let p = ActorPath::parse("movie://sys").unwrap();
        assert!(p.is_root());
        assert_eq!(p.name(), "");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(ActorPath::parse("movie://").is_err());
        assert!(ActorPath::parse("http://sys/user").is_err());
        assert!(ActorPath::parse("movie://sys/user//a").is_err());
        assert!(ActorPath::parse("movie://sys@host:1/user").is_err());
        assert!(ActorPath::parse("movie.tcp://sys/user").is_err());
        assert!(ActorPath::parse("movie.tcp://sys@host/user").is_err());
        assert!(ActorPath::parse("movie.tcp://sys@host:notaport/a").is_err());
        assert!(ActorPath::parse("movie://sys/user/a b").is_err());
    }

    #[test]
    fn normalized_key_ignores_address() {
        let local = ActorPath::parse("movie://sys/user/a").unwrap();
        let remote = ActorPath::parse("movie.tcp://sys@h:9000/user/a").unwrap();
        assert_eq!(local.key(), remote.key());
        assert_ne!(local, remote);
    }

    #[test]
    fn child_and_parent() {
        let root = ActorPath::root(Address::local("sys"));
        let user = root.child("user");
        let a = user.child("a");
        assert_eq!(a.parent().unwrap(), user);
        assert_eq!(user.parent().unwrap(), root);
        assert!(root.parent().is_none());
    }
}
