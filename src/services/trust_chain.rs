// src/services/trust_chain.rs
//! Trust chain resolution.
//!
//! Starting from a leaf's Entity Configuration, authority hints are explored
//! depth first, in the order each entity lists them, until a Subordinate
//! Statement issued by a configured trust anchor is reached. The first chain
//! that verifies end to end is returned:
//!
//! ```text
//! [leaf EC, SS(superior_1 -> leaf), ..., SS(anchor -> superior_n), anchor EC]
//! ```
//!
//! Every element is checked before it is appended, so a partially verified
//! chain is never observable. Each Subordinate Statement must also vouch for
//! the key that signed its subject's Entity Configuration. Failing branches are abandoned and the next
//! hint is tried; only when every route is exhausted does resolution fail.

use crate::error::{FederationError, Result};
use crate::models::entity_statement::VerifiedStatement;
use crate::models::trust_chain::TrustChain;
use crate::services::entity_statement::EntityStatementResolver;
use crate::services::subordinate_statement::SubordinateStatementResolver;
use futures::future::{BoxFuture, FutureExt};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Bookkeeping for one resolution call. Never shared between calls.
struct ResolutionContext {
    trust_anchors: HashSet<String>,
    /// Largest depth budget each entity's authority hints were explored with
    explored: HashMap<String, usize>,
    /// Entities on the route currently being explored, leaf first
    path: Vec<String>,
    chain: Vec<VerifiedStatement>,
    /// Subordinate statements that may still be appended
    remaining_depth: usize,
    max_depth: usize,
    /// A route was cut short by the depth budget or a cycle
    truncated: bool,
    failures: Vec<FederationError>,
}

impl ResolutionContext {
    fn new(trust_anchors: &HashSet<String>, max_depth: usize) -> Self {
        ResolutionContext {
            trust_anchors: trust_anchors.clone(),
            explored: HashMap::new(),
            path: Vec::new(),
            chain: Vec::new(),
            remaining_depth: max_depth,
            max_depth,
            truncated: false,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, hint: &str, err: FederationError) {
        warn!("Authority {} rejected: {}", hint, err);
        self.failures.push(err);
    }

    /// Error reported once every route is exhausted: a verification failure
    /// beats a depth/cycle cut-off, which beats a plain dead end.
    fn into_failure(self, entity_identifier: &str) -> FederationError {
        let ResolutionContext {
            failures,
            truncated,
            max_depth,
            ..
        } = self;
        if let Some(err) = failures
            .into_iter()
            .find(FederationError::is_verification_failure)
        {
            return err;
        }
        if truncated {
            return FederationError::DepthExceeded {
                entity: entity_identifier.to_string(),
                max_depth,
            };
        }
        FederationError::NoPathToTrustAnchor(entity_identifier.to_string())
    }
}

pub struct TrustChainResolver {
    entity_resolver: Arc<EntityStatementResolver>,
    subordinate_resolver: Arc<SubordinateStatementResolver>,
    max_depth: usize,
}

impl TrustChainResolver {
    pub fn new(
        entity_resolver: Arc<EntityStatementResolver>,
        subordinate_resolver: Arc<SubordinateStatementResolver>,
        max_depth: usize,
    ) -> Self {
        TrustChainResolver {
            entity_resolver,
            subordinate_resolver,
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Resolves a chain from `entity_identifier` to any of `trust_anchors`
    /// with the configured depth limit.
    pub async fn resolve_trust_chain(
        &self,
        entity_identifier: &str,
        trust_anchors: &HashSet<String>,
    ) -> Result<TrustChain> {
        self.resolve_trust_chain_with_depth(entity_identifier, trust_anchors, self.max_depth)
            .await
    }

    /// Resolves a chain allowing at most `max_depth` Subordinate Statements.
    ///
    /// # Returns
    /// The first fully verified chain, or:
    /// - the leaf's own error if its Entity Configuration fails
    /// - the first verification failure met on any route
    /// - `DepthExceeded` if a route was cut by the depth limit or a cycle
    /// - `NoPathToTrustAnchor` otherwise
    pub async fn resolve_trust_chain_with_depth(
        &self,
        entity_identifier: &str,
        trust_anchors: &HashSet<String>,
        max_depth: usize,
    ) -> Result<TrustChain> {
        info!(
            "Resolving trust chain for {} ({} trust anchors, max depth {})",
            entity_identifier,
            trust_anchors.len(),
            max_depth
        );
        let leaf = self
            .entity_resolver
            .get_entity_configuration(entity_identifier)
            .await?;

        let mut context = ResolutionContext::new(trust_anchors, max_depth);
        context.chain.push(leaf.clone());

        let found = trust_anchors.contains(entity_identifier)
            || self.expand(&mut context, &leaf).await;
        if !found {
            let err = context.into_failure(entity_identifier);
            warn!("No trust chain for {}: {}", entity_identifier, err);
            return Err(err);
        }

        let chain = TrustChain::from_verified(&context.chain)
            .ok_or_else(|| FederationError::NoPathToTrustAnchor(entity_identifier.to_string()))?;
        info!(
            "Resolved trust chain {} -> {} ({} statements)",
            chain.leaf(),
            chain.trust_anchor(),
            chain.len()
        );
        Ok(chain)
    }

    /// Whether `entity` was already explored with at least `budget`
    /// Subordinate Statements left.
    fn already_explored(context: &ResolutionContext, entity: &str, budget: usize) -> bool {
        context
            .explored
            .get(entity)
            .map_or(false, |explored| *explored >= budget)
    }

    /// Explores the authority hints of `frontier`, whose statement is the
    /// last element of the chain. Returns true once the chain is complete;
    /// on false the chain is as it was on entry.
    fn expand<'a>(
        &'a self,
        context: &'a mut ResolutionContext,
        frontier: &'a VerifiedStatement,
    ) -> BoxFuture<'a, bool> {
        async move {
            let subject = frontier.statement.sub.as_str();
            let hints = frontier.statement.authority_hints();
            if hints.is_empty() {
                debug!("{} lists no authority hints", subject);
                context.explored.insert(subject.to_string(), usize::MAX);
                return false;
            }
            if context.remaining_depth == 0 {
                debug!("Depth limit reached below {}", subject);
                context.truncated = true;
                return false;
            }

            let budget = context.remaining_depth;
            let explored = context.explored.entry(subject.to_string()).or_insert(0);
            *explored = (*explored).max(budget);
            context.path.push(subject.to_string());

            let mut found = false;
            for hint in hints {
                if context.path.iter().any(|entity| entity == hint) {
                    debug!("Cycle: {} is already on the current route", hint);
                    context.truncated = true;
                    continue;
                }
                // a superior is expanded with one statement less of budget
                if Self::already_explored(context, hint, budget - 1) {
                    debug!("{} already explored with as much depth budget", hint);
                    continue;
                }

                let superior = match self.entity_resolver.get_entity_configuration(hint).await {
                    Ok(configuration) => configuration,
                    Err(err) => {
                        context.record(hint, err);
                        continue;
                    }
                };
                let statement = match self
                    .subordinate_resolver
                    .get_subordinate_statement_from(&superior, subject)
                    .await
                {
                    Ok(statement) => statement,
                    Err(err) => {
                        context.record(hint, err);
                        continue;
                    }
                };

                if let Err(err) = self
                    .subordinate_resolver
                    .verify_subject_keys(frontier, &statement)
                {
                    context.record(hint, err);
                    continue;
                }

                let mark = context.chain.len();
                context.chain.push(statement);
                if context.trust_anchors.contains(hint) {
                    debug!("Reached trust anchor {}", hint);
                    context.chain.push(superior);
                    found = true;
                    break;
                }

                context.remaining_depth -= 1;
                let complete = self.expand(context, &superior).await;
                context.remaining_depth += 1;
                if complete {
                    found = true;
                    break;
                }
                context.chain.truncate(mark);
            }

            context.path.pop();
            found
        }
        .boxed()
    }
}
