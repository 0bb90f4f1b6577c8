//! Back-reference tag linking a mirror card to its master.
//!
//! The board service has no foreign keys, so a mirror's description carries
//! `[AUTO-SYNCED FROM MASTER - MASTER_ID:<id>]` after the master's own text.
//! The tag is the only durable link and must round-trip exactly.

const TAG_OPEN: &str = "[AUTO-SYNCED FROM MASTER - ";
const MASTER_ID_PREFIX: &str = "MASTER_ID:";

/// `MASTER_ID:<id>` marker for a master card.
pub fn back_reference(master_id: &str) -> String {
    format!("{}{}", MASTER_ID_PREFIX, master_id)
}

/// Full tag appended to every mirror description.
pub fn sync_tag(master_id: &str) -> String {
    format!("{}{}]", TAG_OPEN, back_reference(master_id))
}

/// Description written to a mirror of a master card.
pub fn mirror_description(master_desc: &str, master_id: &str) -> String {
    format!("{}\n\n{}", master_desc, sync_tag(master_id))
}

/// Whether `desc` carries the back-reference to `master_id`.
///
/// The marker must be followed by the closing bracket so `M1` does not match
/// a mirror of `M12`.
pub fn references(desc: &str, master_id: &str) -> bool {
    desc.contains(&format!("{}]", back_reference(master_id)))
}
