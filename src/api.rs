use crate::{
    error::PaxosError,
    fault::FaultProfile,
    types::{NodeId, RoundOutcome, Value},
};

/// Operations a driver uses to run an election on the council.
pub trait ElectionApi {
    fn propose(
        &self,
        node: NodeId,
    ) -> impl Future<Output = Result<RoundOutcome, PaxosError>> + Send;

    fn set_fault_profile(&self, node: NodeId, profile: FaultProfile) -> Result<(), PaxosError>;

    fn highest_accepted_value(&self, node: NodeId) -> Result<Option<Value>, PaxosError>;

    fn start(&self, node: NodeId) -> impl Future<Output = Result<(), PaxosError>> + Send;
    fn stop(&self, node: NodeId) -> impl Future<Output = Result<(), PaxosError>> + Send;
}
