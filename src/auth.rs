//! Detection of the `juju trust` grant.
//!
//! Without trust the charm's service account cannot touch anything outside what Juju set up for
//! it. Every handler that reaches the cluster first asks the [AuthGate]; a 403 turns the unit
//! `Blocked` and the handler returns early.

use crate::error::Result;
use crate::k8s::ObjectRepository;
use crate::unit::Unit;
use crate::unit::UnitStatus;

pub const TRUST_MESSAGE: &str = "Run juju trust on this application to continue";

/// Remembers a successful permission check for the rest of the hook invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthGate {
    verified: bool,
}

impl AuthGate {
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Returns whether the charm may manage cluster objects.
    ///
    /// A forbidden check sets the unit `Blocked` and yields `Ok(false)`. Any other failure is
    /// returned, it says nothing about the grant.
    pub async fn check<C, U>(&mut self, cluster: &C, unit: &U) -> Result<bool>
    where
        C: ObjectRepository,
        U: Unit,
    {
        if self.verified {
            return Ok(true);
        }

        match cluster.list_cluster_roles().await {
            Ok(()) => {
                self.verified = true;
                Ok(true)
            }
            Err(e) if e.is_forbidden() => {
                log::warn!(error:% = e; "Not authorized to manage cluster objects");
                unit.set_status(UnitStatus::blocked(TRUST_MESSAGE)).await?;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCluster;
    use crate::testing::FakeUnit;
    use crate::testing::Verb;

    #[tokio::test]
    async fn test_granted_trust_is_cached() {
        // Given: A cluster that allows the check
        let cluster = FakeCluster::default();
        let unit = FakeUnit::default();
        let mut gate = AuthGate::default();

        // When: Checking twice
        assert!(gate.check(&cluster, &unit).await.unwrap());
        assert!(gate.check(&cluster, &unit).await.unwrap());

        // Then: The cluster was checked once and the status is untouched
        assert_eq!(cluster.calls_with(Verb::ListClusterRoles).len(), 1);
        assert!(gate.is_verified());
        assert!(unit.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_forbidden_check_blocks_the_unit() {
        // Given: The application was not trusted
        let cluster = FakeCluster::default();
        cluster.fail(Verb::ListClusterRoles, "ClusterRole", 403);
        let unit = FakeUnit::default();
        let mut gate = AuthGate::default();

        // When: Checking
        let authorized = gate.check(&cluster, &unit).await.unwrap();

        // Then: The unit asks for trust and nothing is cached
        assert!(!authorized);
        assert!(!gate.is_verified());
        assert_eq!(unit.statuses(), vec![UnitStatus::blocked(TRUST_MESSAGE)]);
    }

    #[tokio::test]
    async fn test_forbidden_check_is_retried_after_trust() {
        // Given: A first check without trust
        let cluster = FakeCluster::default();
        cluster.fail(Verb::ListClusterRoles, "ClusterRole", 403);
        let unit = FakeUnit::default();
        let mut gate = AuthGate::default();
        assert!(!gate.check(&cluster, &unit).await.unwrap());

        // When: Trust is granted and the gate is asked again
        cluster.heal();

        // Then: The check runs again and succeeds
        assert!(gate.check(&cluster, &unit).await.unwrap());
        assert_eq!(cluster.calls_with(Verb::ListClusterRoles).len(), 2);
    }

    #[tokio::test]
    async fn test_other_check_errors_propagate() {
        // Given: The API server is unavailable
        let cluster = FakeCluster::default();
        cluster.fail(Verb::ListClusterRoles, "ClusterRole", 503);
        let unit = FakeUnit::default();

        // Then: The error is returned and the unit is not blocked
        let error = AuthGate::default().check(&cluster, &unit).await.unwrap_err();
        assert_eq!(error.api_code(), Some(503));
        assert!(unit.statuses().is_empty());
    }
}
