//! License expressions.
//!
//! Recipes declare licenses as a small tree that renders to an SPDX
//! expression:
//!
//! ```toml
//! [package.license]
//! all_of = [
//!     "Apache-2.0",
//!     { id = "Apache-2.0", with = "LLVM-exception" },
//!     { any_of = ["MIT", "NCSA"] },
//! ]
//! ```

use serde::{Deserialize, Serialize};

/// A license expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LicenseExpr {
    /// A single SPDX identifier.
    Id(String),
    /// An identifier with an exception (`Apache-2.0 WITH LLVM-exception`).
    With {
        /// SPDX license identifier.
        id: String,
        /// SPDX exception identifier.
        with: String,
    },
    /// Every operand applies.
    AllOf {
        /// Operands joined with `AND`.
        all_of: Vec<LicenseExpr>,
    },
    /// The licensee may choose any operand.
    AnyOf {
        /// Operands joined with `OR`.
        any_of: Vec<LicenseExpr>,
    },
}

impl LicenseExpr {
    fn is_compound(&self) -> bool {
        match self {
            Self::AllOf { all_of: ops } | Self::AnyOf { any_of: ops } => ops.len() > 1,
            _ => false,
        }
    }

    fn write_joined(
        f: &mut std::fmt::Formatter<'_>,
        ops: &[LicenseExpr],
        sep: &str,
    ) -> std::fmt::Result {
        for (i, op) in ops.iter().enumerate() {
            if i > 0 {
                write!(f, " {sep} ")?;
            }
            if op.is_compound() {
                write!(f, "({op})")?;
            } else {
                write!(f, "{op}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for LicenseExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::With { id, with } => write!(f, "{id} WITH {with}"),
            Self::AllOf { all_of } => Self::write_joined(f, all_of, "AND"),
            Self::AnyOf { any_of } => Self::write_joined(f, any_of, "OR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        license: LicenseExpr,
    }

    #[test]
    fn renders_nested_expression() {
        let parsed: Wrapper = toml::from_str(
            r#"
[license]
all_of = [
    "Apache-2.0",
    { id = "Apache-2.0", with = "LLVM-exception" },
    { any_of = ["MIT", "NCSA"] },
]
"#,
        )
        .unwrap();

        assert_eq!(
            parsed.license.to_string(),
            "Apache-2.0 AND Apache-2.0 WITH LLVM-exception AND (MIT OR NCSA)"
        );
    }

    #[test]
    fn plain_identifier() {
        let parsed: Wrapper = toml::from_str(r#"license = "MIT""#).unwrap();
        assert_eq!(parsed.license, LicenseExpr::Id("MIT".to_string()));
        assert_eq!(parsed.license.to_string(), "MIT");
    }
}
