//! Substitution rule table
//!
//! Rules are plain data, usually loaded from the `[[rules]]` list of a TOML
//! file:
//!
//! ```toml
//! [[rules]]
//! original = "System.String"
//! replacement = "Mini.MiniString"
//! replace_entire_type = true
//!
//! [[rules]]
//! original = "System.Math"
//! method = "Abs"
//! replacement = "Mini.MiniMath"
//! ```
//!
//! [`RuleSet::compile`] sorts them into the fixed evaluation order once.

use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, ResolveResult};

/// One substitution rule as written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Type whose members are substituted
    pub original: String,
    /// Restrict the rule to one method of the original type
    #[serde(default)]
    pub method: Option<String>,
    /// Match methods by parameter names instead of signature
    #[serde(default)]
    pub parameter_names: Option<Vec<String>>,
    /// Type providing the reimplementation
    pub replacement: String,
    /// Name of the replacing method when it differs from the original
    #[serde(default)]
    pub replacement_method: Option<String>,
    /// Every member must come from the replacement
    #[serde(default)]
    pub replace_entire_type: bool,
    /// Apply to every type derived from the original too
    #[serde(default)]
    pub include_subclasses: bool,
}

impl Rule {
    /// Rule replacing one method
    pub fn method(original: impl Into<String>, method: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            method: Some(method.into()),
            parameter_names: None,
            replacement: replacement.into(),
            replacement_method: None,
            replace_entire_type: false,
            include_subclasses: false,
        }
    }

    /// Rule replacing members of a whole type
    pub fn whole_type(original: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            method: None,
            parameter_names: None,
            replacement: replacement.into(),
            replacement_method: None,
            replace_entire_type: false,
            include_subclasses: false,
        }
    }

    /// Require every member to be reimplemented
    pub fn entire(mut self) -> Self {
        self.replace_entire_type = true;
        self
    }

    /// Propagate to derived types
    pub fn with_subclasses(mut self) -> Self {
        self.include_subclasses = true;
        self
    }

    /// Match by parameter names
    pub fn with_parameter_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Evaluation class of this rule
    pub fn priority(&self) -> RulePriority {
        if self.parameter_names.is_some() {
            RulePriority::ParameterNames
        } else if self.method.is_some() {
            RulePriority::Method
        } else if self.include_subclasses {
            RulePriority::Hierarchy
        } else {
            RulePriority::Type
        }
    }
}

/// Evaluation classes, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RulePriority {
    /// Exact method on a specific type
    Method = 1,
    /// Whole type
    Type = 2,
    /// Whole type and its subclasses
    Hierarchy = 3,
    /// Parameter-name match against a free function
    ParameterNames = 4,
}

#[derive(Debug, Default, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<Rule>,
}

/// Rules sorted into evaluation order; declaration order breaks ties
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<(RulePriority, usize, Rule)>,
}

impl RuleSet {
    /// Sort rules into evaluation order, rejecting malformed ones
    pub fn compile(rules: Vec<Rule>) -> ResolveResult<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for (index, rule) in rules.into_iter().enumerate() {
            if rule.original.is_empty() || rule.replacement.is_empty() {
                return Err(ResolveError::invalid_rule(index, "original and replacement are required"));
            }
            if rule.original == rule.replacement {
                return Err(ResolveError::invalid_rule(index, "a type cannot replace itself"));
            }
            if rule.replace_entire_type && rule.method.is_some() {
                return Err(ResolveError::invalid_rule(
                    index,
                    "replace_entire_type applies to whole-type rules only",
                ));
            }
            compiled.push((rule.priority(), index, rule));
        }
        compiled.sort_by_key(|(priority, index, _)| (*priority, *index));
        Ok(Self { rules: compiled })
    }

    /// Parse a `[[rules]]` table
    pub fn from_toml(text: &str) -> ResolveResult<Self> {
        let file: RuleFile = toml::from_str(text)?;
        Self::compile(file.rules)
    }

    /// Parse a JSON array of rules
    pub fn from_json(text: &str) -> ResolveResult<Self> {
        let rules: Vec<Rule> = serde_json::from_str(text)?;
        Self::compile(rules)
    }

    /// Rules of one class in evaluation order
    pub fn of(&self, priority: RulePriority) -> impl Iterator<Item = &Rule> {
        self.rules
            .iter()
            .filter(move |(p, _, _)| *p == priority)
            .map(|(_, _, rule)| rule)
    }

    /// All rules in evaluation order
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|(_, _, rule)| rule)
    }

    /// Rules in evaluation order with their declaration index
    pub fn indexed(&self) -> impl Iterator<Item = (usize, &Rule)> {
        self.rules.iter().map(|(_, index, rule)| (*index, rule))
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let set = RuleSet::compile(vec![
            Rule::whole_type("A", "MiniA").with_parameter_names(["x"]),
            Rule::whole_type("B", "MiniB").with_subclasses(),
            Rule::whole_type("C", "MiniC"),
            Rule::method("D", "Run", "MiniD"),
        ])
        .unwrap();
        let order: Vec<_> = set.iter().map(|r| r.original.as_str()).collect();
        assert_eq!(order, vec!["D", "C", "B", "A"]);
    }

    #[test]
    fn test_from_toml() {
        let set = RuleSet::from_toml(
            r#"
            [[rules]]
            original = "System.String"
            replacement = "Mini.MiniString"
            replace_entire_type = true

            [[rules]]
            original = "System.Math"
            method = "Abs"
            replacement = "Mini.MiniMath"
            "#,
        )
        .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.of(RulePriority::Method).count(), 1);
        assert!(set.of(RulePriority::Type).next().unwrap().replace_entire_type);
    }

    #[test]
    fn test_malformed_rules_rejected() {
        assert!(RuleSet::compile(vec![Rule::whole_type("A", "A")]).is_err());
        let mut rule = Rule::method("A", "Run", "B");
        rule.replace_entire_type = true;
        assert!(matches!(
            RuleSet::compile(vec![Rule::whole_type("X", "Y"), rule]),
            Err(ResolveError::InvalidRule { index: 1, .. })
        ));
    }
}
