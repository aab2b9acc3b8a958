//! Operation descriptors: the typed parameter table each operation binds against

use std::fmt;

/// Expected type of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Str,
    Int,
    Bool,
    List,
    Dict,
    Any,
}

impl ArgType {
    pub fn name(self) -> &'static str {
        match self {
            ArgType::Str => "string",
            ArgType::Int => "int",
            ArgType::Bool => "bool",
            ArgType::List => "list",
            ArgType::Dict => "dict",
            ArgType::Any => "value",
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a parameter must be supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    /// Marked `?`
    Optional,
    /// Marked `??`: an explicit `nil` counts as absent
    OptionalNilAbsent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub key: &'static str,
    pub ty: ArgType,
    pub presence: Presence,
}

impl ParamSpec {
    /// Parse a key with its optional `?` / `??` suffix.
    pub fn parse(raw: &'static str, ty: ArgType) -> Self {
        let (key, presence) = if let Some(key) = raw.strip_suffix("??") {
            (key, Presence::OptionalNilAbsent)
        } else if let Some(key) = raw.strip_suffix('?') {
            (key, Presence::Optional)
        } else {
            (raw, Presence::Required)
        };
        Self { key, ty, presence }
    }

    pub fn is_required(&self) -> bool {
        self.presence == Presence::Required
    }
}

/// Parameters every operation accepts after its own.
const COMMON_PARAMS: &[(&str, ArgType)] = &[
    ("name", ArgType::Str),
    ("only_if??", ArgType::Bool),
    ("not_if??", ArgType::Bool),
    ("timeout??", ArgType::Str),
    ("working_directory??", ArgType::Str),
    ("what_if??", ArgType::Bool),
];

/// Kind name plus ordered parameter list. Positional arguments bind in this
/// order: the operation's own parameters first, then the common ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    kind: &'static str,
    params: Vec<ParamSpec>,
}

impl Descriptor {
    pub fn new(kind: &'static str, params: &[(&'static str, ArgType)]) -> Self {
        let params = params
            .iter()
            .chain(COMMON_PARAMS.iter())
            .map(|(raw, ty)| ParamSpec::parse(raw, *ty))
            .collect();
        Self { kind, params }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.key == key)
    }
}
