//! Type identifiers (§6): `TypeDefName`, `TypeDefId`, `AbsoluteTypeDefId`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TddbError};

/// `"module.name"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDefName {
    pub module: String,
    pub name: String,
}

impl TypeDefName {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TypeDefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

impl FromStr for TypeDefName {
    type Err = TddbError;

    fn from_str(s: &str) -> Result<Self> {
        let (module, name) = s
            .split_once('.')
            .ok_or_else(|| TddbError::parse(format!("malformed type name: {s:?}")))?;
        if module.is_empty() || name.is_empty() {
            return Err(TddbError::parse(format!("malformed type name: {s:?}")));
        }
        Ok(TypeDefName::new(module, name))
    }
}

/// The optional version suffix of a `TypeDefId`: an exact `<major>.<minor>`,
/// a bare `<major>`, or an MD5 hex digest identifying the AST/schema
/// content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    Exact { major: u32, minor: u32 },
    Major(u32),
    Md5(String),
}

fn looks_like_md5(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}

impl FromStr for VersionSelector {
    type Err = TddbError;

    fn from_str(s: &str) -> Result<Self> {
        if looks_like_md5(s) {
            return Ok(VersionSelector::Md5(s.to_lowercase()));
        }
        if let Some((major_str, minor_str)) = s.split_once('.') {
            let major = major_str
                .parse()
                .map_err(|_| TddbError::parse(format!("malformed version selector: {s:?}")))?;
            let minor = minor_str
                .parse()
                .map_err(|_| TddbError::parse(format!("malformed version selector: {s:?}")))?;
            return Ok(VersionSelector::Exact { major, minor });
        }
        let major = s
            .parse()
            .map_err(|_| TddbError::parse(format!("malformed version selector: {s:?}")))?;
        Ok(VersionSelector::Major(major))
    }
}

/// `"module.name"` optionally suffixed `"-<ver>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefId {
    pub name: TypeDefName,
    pub version: Option<VersionSelector>,
}

impl FromStr for TypeDefId {
    type Err = TddbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('-') {
            Some((name_part, version_part)) => Ok(TypeDefId {
                name: name_part.parse()?,
                version: Some(version_part.parse()?),
            }),
            None => Ok(TypeDefId {
                name: s.parse()?,
                version: None,
            }),
        }
    }
}

/// `"module.name-<major>.<minor>"`: a fully pinned reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsoluteTypeDefId {
    pub name: TypeDefName,
    pub major: u32,
    pub minor: u32,
}

impl AbsoluteTypeDefId {
    pub fn new(name: TypeDefName, major: u32, minor: u32) -> Self {
        Self { name, major, minor }
    }
}

impl fmt::Display for AbsoluteTypeDefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.major, self.minor)
    }
}

impl FromStr for AbsoluteTypeDefId {
    type Err = TddbError;

    fn from_str(s: &str) -> Result<Self> {
        let (name_part, version_part) = s
            .rsplit_once('-')
            .ok_or_else(|| TddbError::parse(format!("malformed absolute type id: {s:?}")))?;
        let name = name_part.parse()?;
        let version: crate::version::TypeVersion = version_part.parse()?;
        Ok(AbsoluteTypeDefId::new(name, version.major, version.minor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_def_name() {
        let name: TypeDefName = "Mod.Foo".parse().unwrap();
        assert_eq!(name, TypeDefName::new("Mod", "Foo"));
        assert_eq!(name.to_string(), "Mod.Foo");
    }

    #[test]
    fn parses_type_def_id_variants() {
        let bare: TypeDefId = "Mod.Foo".parse().unwrap();
        assert_eq!(bare.version, None);

        let major: TypeDefId = "Mod.Foo-2".parse().unwrap();
        assert_eq!(major.version, Some(VersionSelector::Major(2)));

        let exact: TypeDefId = "Mod.Foo-2.3".parse().unwrap();
        assert_eq!(
            exact.version,
            Some(VersionSelector::Exact { major: 2, minor: 3 })
        );

        let md5: TypeDefId = "Mod.Foo-d41d8cd98f00b204e9800998ecf8427e".parse().unwrap();
        assert_eq!(
            md5.version,
            Some(VersionSelector::Md5(
                "d41d8cd98f00b204e9800998ecf8427e".to_string()
            ))
        );
    }

    #[test]
    fn parses_absolute_type_def_id() {
        let id: AbsoluteTypeDefId = "Mod.Foo-1.2".parse().unwrap();
        assert_eq!(id.name, TypeDefName::new("Mod", "Foo"));
        assert_eq!(id.major, 1);
        assert_eq!(id.minor, 2);
        assert_eq!(id.to_string(), "Mod.Foo-1.2");
    }
}
