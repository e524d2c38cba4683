//! Assertions on a transformed proxy
//!
//! After extraction, the proxy descriptor must declare an HTTPS connector
//! for the processed direction, together with its endpoint, and the keystore
//! must be bundled next to it.
//!
//! # Example
//!
//! ```ignore
//! use gatecheck::verify::{verify_extracted, Direction};
//!
//! let report = verify_extracted(&workspace.tmp_dir(), Direction::Outbound).await?;
//! assert_eq!(report.protocol, "https");
//! ```

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::workspace::{DESCRIPTOR_NAME, KEYSTORE_NAME};

/// Protocol attribute value required on the connector config
pub const HTTPS_PROTOCOL: &str = "https";

/// Error type for verification
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("failed to read descriptor {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed descriptor {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("verification failed: {}", .failures.join("; "))]
    Failed { failures: Vec<String> },
}

/// Which side of the proxy was modified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The listener the proxy exposes
    Inbound,
    /// The request the proxy sends to the implementation
    Outbound,
}

impl Direction {
    /// Connector config element for this direction
    pub fn config_tag(self) -> &'static str {
        match self {
            Direction::Inbound => "http:listener-config",
            Direction::Outbound => "http:request-config",
        }
    }

    /// Endpoint element for this direction
    pub fn endpoint_tag(self) -> &'static str {
        match self {
            Direction::Inbound => "http:listener",
            Direction::Outbound => "http:request",
        }
    }

    fn config_label(self) -> &'static str {
        match self {
            Direction::Inbound => "HTTPS listener config",
            Direction::Outbound => "HTTPS request config",
        }
    }

    fn endpoint_label(self) -> &'static str {
        match self {
            Direction::Inbound => "HTTPS inbound",
            Direction::Outbound => "HTTPS outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// An element of the descriptor: qualified name and attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Parsed proxy descriptor, elements in document order
#[derive(Debug, Clone, Default)]
pub struct ProxyDescriptor {
    elements: Vec<Element>,
}

impl ProxyDescriptor {
    /// Parse descriptor XML
    pub fn parse(xml: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut elements = Vec::new();
        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => elements.push(element(e)?),
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(format!(
                        "error at position {}: {}",
                        reader.buffer_position(),
                        e
                    ))
                }
            }
        }

        if elements.is_empty() {
            return Err("document has no elements".to_string());
        }
        Ok(Self { elements })
    }

    /// Read and parse a descriptor file
    pub async fn load(path: &Path) -> Result<Self, VerifyError> {
        let xml = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| VerifyError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&xml).map_err(|reason| VerifyError::Malformed {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// First element with the given qualified name
    pub fn first(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// All elements with the given qualified name
    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements.iter().filter(move |e| e.name == name)
    }

    /// Root element
    pub fn root(&self) -> Option<&Element> {
        self.elements.first()
    }
}

fn element(start: &BytesStart<'_>) -> Result<Element, String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = BTreeMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| format!("bad attribute on <{}>: {}", name, e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| format!("bad value for {} on <{}>: {}", key, name, e))?
            .into_owned();
        attributes.insert(key, value);
    }
    Ok(Element { name, attributes })
}

/// Fluent checks on a descriptor, collecting every failure
pub struct DescriptorAssertion<'a> {
    descriptor: &'a ProxyDescriptor,
    failures: Vec<String>,
}

impl<'a> DescriptorAssertion<'a> {
    pub fn new(descriptor: &'a ProxyDescriptor) -> Self {
        Self {
            descriptor,
            failures: Vec::new(),
        }
    }

    /// Assert an element is present
    pub fn has_element(mut self, name: &str, what: &str) -> Self {
        if self.descriptor.first(name).is_none() {
            self.failures
                .push(format!("Proxy file should contain {} element <{}>", what, name));
        }
        self
    }

    /// Assert the first `name` element carries `attribute="expected"`
    ///
    /// A missing element is reported by `has_element`, not here.
    pub fn attribute_equals(self, name: &str, attribute: &str, expected: &str) -> Self {
        self.attribute_matches(name, attribute, expected, |a, b| a == b)
    }

    /// Like `attribute_equals`, ignoring ASCII case
    pub fn attribute_equals_ignore_case(self, name: &str, attribute: &str, expected: &str) -> Self {
        self.attribute_matches(name, attribute, expected, str::eq_ignore_ascii_case)
    }

    fn attribute_matches(
        mut self,
        name: &str,
        attribute: &str,
        expected: &str,
        eq: impl Fn(&str, &str) -> bool,
    ) -> Self {
        if let Some(element) = self.descriptor.first(name) {
            match element.attribute(attribute) {
                Some(actual) if eq(actual, expected) => {}
                Some(actual) => self.failures.push(format!(
                    "<{}> should have {}=\"{}\", got \"{}\"",
                    name, attribute, expected, actual
                )),
                None => self.failures.push(format!(
                    "<{}> should have {}=\"{}\", attribute missing",
                    name, attribute, expected
                )),
            }
        }
        self
    }

    /// Record a failure from a check outside the descriptor
    pub fn check(mut self, ok: bool, failure: impl Into<String>) -> Self {
        if !ok {
            self.failures.push(failure.into());
        }
        self
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// Check all assertions and return result
    pub fn result(self) -> Result<(), VerifyError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(VerifyError::Failed {
                failures: self.failures,
            })
        }
    }
}

/// What a passing verification saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub direction: Direction,
    pub descriptor: PathBuf,
    pub keystore: PathBuf,
    pub protocol: String,
}

/// Verify an extracted proxy directory for `direction`
pub async fn verify_extracted(
    extract_dir: &Path,
    direction: Direction,
) -> Result<VerificationReport, VerifyError> {
    let descriptor_path = extract_dir.join(DESCRIPTOR_NAME);
    let keystore = extract_dir.join(KEYSTORE_NAME);
    let descriptor = ProxyDescriptor::load(&descriptor_path).await?;
    let keystore_packaged = tokio::fs::try_exists(&keystore).await.unwrap_or(false);

    verify_descriptor(&descriptor, direction, keystore_packaged)?;

    let protocol = descriptor
        .first(direction.config_tag())
        .and_then(|e| e.attribute("protocol"))
        .unwrap_or_default()
        .to_string();
    Ok(VerificationReport {
        direction,
        descriptor: descriptor_path,
        keystore,
        protocol,
    })
}

/// The checks for one direction, on an already parsed descriptor
pub fn verify_descriptor(
    descriptor: &ProxyDescriptor,
    direction: Direction,
    keystore_packaged: bool,
) -> Result<(), VerifyError> {
    DescriptorAssertion::new(descriptor)
        .has_element(direction.config_tag(), direction.config_label())
        .attribute_equals_ignore_case(direction.config_tag(), "protocol", HTTPS_PROTOCOL)
        .has_element(direction.endpoint_tag(), direction.endpoint_label())
        .check(keystore_packaged, format!("Keystore {} should be packaged", KEYSTORE_NAME))
        .result()
}
