//! Blob naming used by the Event Hubs SDK checkpoint stores.

/// Metadata key holding a checkpoint's sequence number.
pub const SEQUENCE_NUMBER_KEY: &str = "sequencenumber";

/// Metadata key holding a checkpoint's offset.
pub const OFFSET_KEY: &str = "offset";

/// Metadata key holding an ownership's owner id.
pub const OWNER_ID_KEY: &str = "ownerid";

/// Prefix under which a consumer group's checkpoint blobs live. Each blob
/// under it is named after its partition id.
///
/// Processors write these paths lowercased.
#[must_use]
pub fn checkpoint_prefix(namespace: &str, hub: &str, consumer_group: &str) -> String {
    format!("{namespace}/{hub}/{consumer_group}/checkpoint/").to_lowercase()
}

/// Prefix under which a consumer group's ownership blobs live.
#[must_use]
pub fn ownership_prefix(namespace: &str, hub: &str, consumer_group: &str) -> String {
    format!("{namespace}/{hub}/{consumer_group}/ownership/").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(
            checkpoint_prefix("NS.servicebus.windows.net", "Orders", "$Default"),
            "ns.servicebus.windows.net/orders/$default/checkpoint/"
        );
        assert_eq!(
            ownership_prefix("ns.servicebus.windows.net", "orders", "billing"),
            "ns.servicebus.windows.net/orders/billing/ownership/"
        );
    }
}
