//! Deployment step descriptors and tag-based selection.

use std::collections::BTreeSet;
use std::fmt;

use alloy_core::primitives::Address;
use serde::{Deserialize, Deserializer, Serialize};

/// The named account a step deploys from when none is given.
pub const DEFAULT_FROM_ACCOUNT: &str = "deployer";

/// A constructor argument as declared in the manifest.
///
/// In TOML a literal is a plain string and a reference is an inline table:
///
/// ```toml
/// args = [{ address_of = "DAOImplementation" }, "0x9051...449E"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstructorArg {
    /// The address recorded for another step.
    AddressOf { address_of: String },
    /// A value passed through unchanged.
    Literal(String),
}

impl ConstructorArg {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn address_of(step: impl Into<String>) -> Self {
        Self::AddressOf {
            address_of: step.into(),
        }
    }

    /// The step this argument depends on, if any.
    pub fn dependency(&self) -> Option<&str> {
        match self {
            Self::AddressOf { address_of } => Some(address_of),
            Self::Literal(_) => None,
        }
    }
}

/// A constructor argument after registry resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedArg {
    Literal(String),
    Address(Address),
}

impl fmt::Display for ResolvedArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.write_str(value),
            Self::Address(address) => write!(f, "{address}"),
        }
    }
}

/// One named deployment action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentStep {
    /// Registry key for the resulting deployment.
    pub name: String,
    /// Artifact name of the contract to deploy.
    pub contract: String,
    /// Ordered constructor arguments.
    pub args: Vec<ConstructorArg>,
    /// Tags used for selective execution.
    pub tags: BTreeSet<String>,
    /// Named account the deployment is sent from.
    pub from: String,
}

/// Manifest form of a step, where `tags` and `from` may be omitted.
#[derive(Deserialize)]
struct RawStep {
    name: String,
    contract: Option<String>,
    #[serde(default)]
    args: Vec<ConstructorArg>,
    tags: Option<BTreeSet<String>>,
    from: Option<String>,
}

impl<'de> Deserialize<'de> for DeploymentStep {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawStep::deserialize(deserializer)?;
        let tags = raw
            .tags
            .unwrap_or_else(|| BTreeSet::from([raw.name.clone()]));

        Ok(Self {
            contract: raw.contract.unwrap_or_else(|| raw.name.clone()),
            name: raw.name,
            args: raw.args,
            tags,
            from: raw.from.unwrap_or_else(|| DEFAULT_FROM_ACCOUNT.to_string()),
        })
    }
}

impl DeploymentStep {
    /// Create a step deploying `contract` under `name`, tagged with its own name.
    pub fn new(name: impl Into<String>, contract: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            tags: BTreeSet::from([name.clone()]),
            name,
            contract: contract.into(),
            args: Vec::new(),
            from: DEFAULT_FROM_ACCOUNT.to_string(),
        }
    }

    pub fn arg(mut self, arg: ConstructorArg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = ConstructorArg>) -> Self {
        self.args.extend(args);
        self
    }

    /// Add a tag on top of the default one.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn from_account(mut self, account: impl Into<String>) -> Self {
        self.from = account.into();
        self
    }

    /// Names of the steps whose addresses this step consumes, in argument order.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(ConstructorArg::dependency)
    }

    /// The tag an operator should run to produce this step's record.
    pub fn primary_tag(&self) -> &str {
        if self.tags.contains(&self.name) {
            return &self.name;
        }
        self.tags
            .iter()
            .next()
            .map(String::as_str)
            .unwrap_or(&self.name)
    }
}

/// Predicate restricting which steps run in an invocation.
///
/// An empty filter selects every step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    tags: BTreeSet<String>,
}

impl TagFilter {
    /// A filter selecting every step.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags
                .into_iter()
                .map(Into::into)
                .filter(|tag: &String| !tag.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn matches(&self, step: &DeploymentStep) -> bool {
        self.tags.is_empty() || step.tags.iter().any(|tag| self.tags.contains(tag))
    }

    /// The selected steps, in declaration order.
    pub fn select<'a>(&self, steps: &'a [DeploymentStep]) -> Vec<&'a DeploymentStep> {
        steps.iter().filter(|step| self.matches(step)).collect()
    }
}
