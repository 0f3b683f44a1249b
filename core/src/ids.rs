use uuid::Uuid;

/// Hex characters kept from a random UUID (48 bits of entropy).
pub const ID_LEN: usize = 12;

/// Generate a short opaque identifier for nodes, decision events and sessions.
/// Lowercase hex only, so it is safe as a map key and inside file names.
pub fn new_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ID_LEN);
    id
}
