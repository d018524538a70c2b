use serde::{Deserialize, Serialize};

/// Client-hint headers. All optional: older browsers send none of them,
/// and absence only ever costs the component's configured weight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHints {
    pub platform: Option<String>,
    pub mobile: Option<String>,
    pub vendor: Option<String>,
}

/// Raw request characteristics the excluded HTTP layer extracts for us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestAttributes {
    pub ip: String,
    pub user_agent: String,
    pub accept_language: Option<String>,
    pub accept_encoding: Option<String>,
    pub client_hints: ClientHints,
}

impl RequestAttributes {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
            accept_language: None,
            accept_encoding: None,
            client_hints: ClientHints::default(),
        }
    }

    pub fn accept_language(mut self, value: impl Into<String>) -> Self {
        self.accept_language = Some(value.into());
        self
    }

    pub fn accept_encoding(mut self, value: impl Into<String>) -> Self {
        self.accept_encoding = Some(value.into());
        self
    }

    pub fn client_hints(mut self, hints: ClientHints) -> Self {
        self.client_hints = hints;
        self
    }
}

/// The plaintext component vector a fingerprint is derived from.
///
/// Retained server-side alongside the digests so similarity can be computed
/// field-by-field later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintComponents {
    pub ip: String,
    /// User agent with version numbers wildcarded.
    pub user_agent: String,
    pub accept_language: Option<String>,
    pub accept_encoding: Option<String>,
    pub platform: Option<String>,
    pub mobile: Option<String>,
    pub vendor: Option<String>,
}

impl FingerprintComponents {
    /// Canonical string fed to both digests. Field order is part of the
    /// format; changing it invalidates every stored fingerprint.
    pub fn canonical(&self) -> String {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        format!(
            "ip={}|ua={}|lang={}|enc={}|platform={}|mobile={}|vendor={}",
            self.ip,
            self.user_agent,
            opt(&self.accept_language),
            opt(&self.accept_encoding),
            opt(&self.platform),
            opt(&self.mobile),
            opt(&self.vendor),
        )
    }
}
