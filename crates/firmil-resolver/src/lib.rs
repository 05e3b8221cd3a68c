//! # firmil resolver
//!
//! Decides how each type and method referenced by a program is realized on the
//! device, and hands out the session tokens that name them.
//!
//! ## Design Principles
//!
//! - **Rules as data**: Substitutions are a table loaded once, not annotations on declarations
//! - **Fixed priority**: Method rules beat type rules, which beat subclass rules and shims
//! - **No silent fallback**: A type marked for complete replacement rejects members it lacks
//! - **Stable tokens**: One token per entity per session, assigned under a single writer

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod decision;
pub mod error;
pub mod hierarchy;
pub mod resolver;
pub mod rules;
pub mod tokens;

pub use decision::{Decision, Target};
pub use error::{ResolveError, ResolveResult};
pub use hierarchy::TypeHierarchy;
pub use resolver::Resolver;
pub use rules::{Rule, RulePriority, RuleSet};
pub use tokens::TokenTable;
