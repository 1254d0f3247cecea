use uuid::Uuid;

/// Majority quorum for `node_count` acceptors: `floor(n/2) + 1`.
pub fn majority_quorum(node_count: usize) -> usize {
    node_count / 2 + 1
}

/// Generate 32-bit round ID from UUID using first 4 bytes, used to correlate the events of one
/// `propose` call.
pub fn generate_round_id() -> u32 {
    let uuid = Uuid::new_v4();
    let uuid_bytes = uuid.as_bytes();
    ((uuid_bytes[0] as u32) << 24)
        | ((uuid_bytes[1] as u32) << 16)
        | ((uuid_bytes[2] as u32) << 8)
        | (uuid_bytes[3] as u32)
}
