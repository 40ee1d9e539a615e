// Swarm engine abstraction: the collaborator that owns peers, pieces and storage.

pub mod rqbit;
pub mod traits;
