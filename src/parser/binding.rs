//! Binding declarations and peer references.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::ParseError;
use crate::description::Value;
use crate::module::Namespace;

/// `[namespace:]module[.port]`
static PEER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<ns>[^:.]+):)?(?P<module>[^:.]+)(?:\.(?P<port>.+))?$")
        .expect("Invalid peer reference regex")
});

/// A parsed peer reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRef {
    pub namespace: Namespace,
    pub module: String,
    /// `None` selects the first port declared by the peer.
    pub port: Option<String>,
}

impl PeerRef {
    /// Parse `text`; the namespace defaults to `default_ns`.
    ///
    /// # Examples
    /// ```
    /// use vplatform::module::Namespace;
    /// use vplatform::parser::PeerRef;
    ///
    /// let peer = PeerRef::parse("backend:uart.tx", Namespace::Component, &Default::default()).unwrap();
    /// assert_eq!(peer.namespace, Namespace::Backend);
    /// assert_eq!(peer.module, "uart");
    /// assert_eq!(peer.port.as_deref(), Some("tx"));
    /// ```
    pub fn parse(text: &str, default_ns: Namespace, node: &Value) -> Result<PeerRef, ParseError> {
        let caps = PEER_PATTERN
            .captures(text.trim())
            .ok_or_else(|| ParseError::InvalidNode {
                message: format!("Invalid peer reference `{}`", text),
                origin: node.origin(),
            })?;

        let namespace = match caps.name("ns") {
            Some(ns) => Namespace::find_by_name(ns.as_str()).ok_or_else(|| ParseError::NamespaceNotFound {
                name: ns.as_str().to_string(),
                origin: node.origin(),
            })?,
            None => default_ns,
        };

        Ok(PeerRef {
            namespace,
            module: caps["module"].to_string(),
            port: caps.name("port").map(|p| p.as_str().to_string()),
        })
    }
}

impl fmt::Display for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.module)?;
        if let Some(port) = &self.port {
            write!(f, ".{}", port)?;
        }
        Ok(())
    }
}

/// A binding of a local port to a peer.
#[derive(Debug, Clone)]
pub struct BindingNode {
    local_port: String,
    peer: PeerRef,
    descr: Value,
}

impl BindingNode {
    pub fn new(local_port: &str, peer: PeerRef, descr: Value) -> Self {
        Self {
            local_port: local_port.to_string(),
            peer,
            descr,
        }
    }

    /// Parse the binding of `local_port` declared by `descr`: either a
    /// peer reference, or a map with a `peer` key and binding parameters.
    pub(crate) fn parse(local_port: &str, descr: &Value, default_ns: Namespace) -> Result<Self, ParseError> {
        let peer = match descr {
            Value::Scalar(_) => descr.clone(),
            Value::Map(_) => {
                if !descr.exists("peer") {
                    return Err(ParseError::MissingField {
                        field: "peer".to_string(),
                        origin: descr.origin(),
                    });
                }
                descr.get("peer")
            }
            _ => {
                return Err(ParseError::InvalidNode {
                    message: "Invalid peer specification".to_string(),
                    origin: descr.origin(),
                })
            }
        };

        let text = peer.parse::<String>().map_err(|_| ParseError::InvalidFieldType {
            field: "peer".to_string(),
            expected: "string",
            origin: peer.origin(),
        })?;

        Ok(BindingNode::new(
            local_port,
            PeerRef::parse(&text, default_ns, &peer)?,
            descr.clone(),
        ))
    }

    pub fn local_port(&self) -> &str {
        &self.local_port
    }

    pub fn peer(&self) -> &PeerRef {
        &self.peer
    }

    /// Description of the binding, handed to the capabilities as binding
    /// context.
    pub fn descr(&self) -> &Value {
        &self.descr
    }
}
