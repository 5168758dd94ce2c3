//! Identity types published by the identity directory.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Status
// =============================================================================

/// Whether the directory allows an identity to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    /// The identity may connect.
    Enabled,
    /// The identity exists but is administratively disabled.
    Disabled,
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

// =============================================================================
// Authentication
// =============================================================================

/// Kind of credential the identity authenticates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthenticationType {
    /// No credential registered.
    None,
    /// Shared access keys.
    Sas,
    /// Self-signed certificate pinned by thumbprint.
    X509Thumbprint,
    /// Certificate issued by a trusted CA.
    X509Ca,
}

impl AuthenticationType {
    /// Wire name of the credential kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sas => "sas",
            Self::X509Thumbprint => "x509Thumbprint",
            Self::X509Ca => "x509Ca",
        }
    }
}

impl fmt::Display for AuthenticationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary and secondary shared access keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymmetricKeys {
    pub primary_key: String,
    pub secondary_key: String,
}

/// Primary and secondary certificate thumbprints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct X509Thumbprints {
    pub primary_thumbprint: String,
    pub secondary_thumbprint: String,
}

/// Credential material attached to an identity.
///
/// The cache never inspects this; it only compares it for equality so that a
/// key rotation counts as an identity update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationMechanism {
    #[serde(rename = "type")]
    pub auth_type: AuthenticationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symmetric_key: Option<SymmetricKeys>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x509_thumbprint: Option<X509Thumbprints>,
}

impl AuthenticationMechanism {
    /// No credential.
    #[must_use]
    pub fn none() -> Self {
        Self {
            auth_type: AuthenticationType::None,
            symmetric_key: None,
            x509_thumbprint: None,
        }
    }

    /// Shared access key credential.
    #[must_use]
    pub fn sas(primary_key: impl Into<String>, secondary_key: impl Into<String>) -> Self {
        Self {
            auth_type: AuthenticationType::Sas,
            symmetric_key: Some(SymmetricKeys {
                primary_key: primary_key.into(),
                secondary_key: secondary_key.into(),
            }),
            x509_thumbprint: None,
        }
    }

    /// Thumbprint-pinned certificate credential.
    #[must_use]
    pub fn x509_thumbprint(
        primary_thumbprint: impl Into<String>,
        secondary_thumbprint: impl Into<String>,
    ) -> Self {
        Self {
            auth_type: AuthenticationType::X509Thumbprint,
            symmetric_key: None,
            x509_thumbprint: Some(X509Thumbprints {
                primary_thumbprint: primary_thumbprint.into(),
                secondary_thumbprint: secondary_thumbprint.into(),
            }),
        }
    }

    /// CA-issued certificate credential.
    #[must_use]
    pub fn x509_ca() -> Self {
        Self {
            auth_type: AuthenticationType::X509Ca,
            symmetric_key: None,
            x509_thumbprint: None,
        }
    }
}

// =============================================================================
// Identity
// =============================================================================

/// A device or module identity as known to the identity directory.
///
/// Two identities are equal iff every field matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    pub generation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_scope: Option<String>,
    #[serde(default)]
    pub parent_scopes: Vec<String>,
    pub authentication: AuthenticationMechanism,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub status: IdentityStatus,
}

impl Identity {
    /// Creates a device identity.
    #[must_use]
    pub fn device(
        device_id: impl Into<String>,
        generation_id: impl Into<String>,
        authentication: AuthenticationMechanism,
        status: IdentityStatus,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            module_id: None,
            generation_id: generation_id.into(),
            device_scope: None,
            parent_scopes: Vec::new(),
            authentication,
            capabilities: Vec::new(),
            status,
        }
    }

    /// Creates a module identity hosted on `device_id`.
    #[must_use]
    pub fn module(
        device_id: impl Into<String>,
        module_id: impl Into<String>,
        generation_id: impl Into<String>,
        authentication: AuthenticationMechanism,
        status: IdentityStatus,
    ) -> Self {
        Self {
            module_id: Some(module_id.into()),
            ..Self::device(device_id, generation_id, authentication, status)
        }
    }

    #[must_use]
    pub fn with_device_scope(mut self, scope: impl Into<String>) -> Self {
        self.device_scope = Some(scope.into());
        self
    }

    #[must_use]
    pub fn with_parent_scopes(mut self, scopes: Vec<String>) -> Self {
        self.parent_scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: IdentityStatus) -> Self {
        self.status = status;
        self
    }

    /// Cache id: `deviceId` for devices, `deviceId/moduleId` for modules.
    #[must_use]
    pub fn id(&self) -> String {
        self.key().to_string()
    }

    #[must_use]
    pub fn key(&self) -> IdentityKey {
        match &self.module_id {
            Some(module_id) => IdentityKey::Module {
                device_id: self.device_id.clone(),
                module_id: module_id.clone(),
            },
            None => IdentityKey::Device {
                device_id: self.device_id.clone(),
            },
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.status == IdentityStatus::Enabled
    }

    #[must_use]
    pub fn is_module(&self) -> bool {
        self.module_id.is_some()
    }
}

// =============================================================================
// Identity Key
// =============================================================================

/// Parsed cache id, selecting which directory lookup applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Device { device_id: String },
    Module { device_id: String, module_id: String },
}

impl IdentityKey {
    /// Parses a cache id.
    ///
    /// Exactly one `/` splits the id into a module key, even when a half is
    /// empty. Anything else is looked up as a device using the whole string.
    #[must_use]
    pub fn parse(id: &str) -> Self {
        match id.split_once('/') {
            Some((device_id, module_id)) if !module_id.contains('/') => Self::Module {
                device_id: device_id.to_string(),
                module_id: module_id.to_string(),
            },
            _ => Self::Device {
                device_id: id.to_string(),
            },
        }
    }

    #[must_use]
    pub fn device_id(&self) -> &str {
        match self {
            Self::Device { device_id } | Self::Module { device_id, .. } => device_id,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device { device_id } => write!(f, "{device_id}"),
            Self::Module {
                device_id,
                module_id,
            } => write!(f, "{device_id}/{module_id}"),
        }
    }
}
