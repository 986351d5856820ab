// src/models/trust_chain.rs
//! Resolved trust chain.

use crate::models::entity_statement::VerifiedStatement;
use serde::{Serialize, Serializer};

/// An ordered, fully verified sequence of compact JWTs.
///
/// # Layout
/// - index 0: the leaf's own Entity Configuration
/// - interior: Subordinate Statements, each issued by the superior of the
///   subject of the previous element
/// - last: the trust anchor's own Entity Configuration
///
/// A degenerate chain of one element is produced when the leaf is itself a
/// trust anchor. Chains are only built by a successful resolution and cannot
/// be modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustChain {
    statements: Vec<String>,
    leaf: String,
    trust_anchor: String,
    expires_at: i64,
}

impl TrustChain {
    /// Assembles a chain from verified statements, leaf first.
    ///
    /// Returns `None` for an empty sequence.
    pub(crate) fn from_verified(statements: &[VerifiedStatement]) -> Option<Self> {
        let first = statements.first()?;
        let last = statements.last()?;
        let expires_at = statements
            .iter()
            .map(|verified| verified.statement.exp)
            .min()?;
        Some(TrustChain {
            statements: statements.iter().map(|verified| verified.jwt.clone()).collect(),
            leaf: first.statement.sub.clone(),
            trust_anchor: last.statement.iss.clone(),
            expires_at,
        })
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether the chain holds no statements.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.statements.iter()
    }

    /// Entity identifier of the leaf.
    pub fn leaf(&self) -> &str {
        &self.leaf
    }

    /// Entity identifier of the trust anchor the chain terminates at.
    pub fn trust_anchor(&self) -> &str {
        &self.trust_anchor
    }

    /// Earliest `exp` across all statements: the chain is unusable after it.
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn into_statements(self) -> Vec<String> {
        self.statements
    }
}

impl<'a> IntoIterator for &'a TrustChain {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.iter()
    }
}

/// Serialises as a JSON array of compact JWTs, the federation wire form.
impl Serialize for TrustChain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.statements.serialize(serializer)
    }
}
