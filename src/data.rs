/// Longest usable stat name, in bytes. Longer names are truncated when the
/// runtime caches a source's name table.
pub const MAX_STAT_NAME_LEN: usize = 127;

/// Most patterns a single source filter will accept.
pub const MAX_FILTER_PATTERNS: usize = 32;

/// One advertised statistic: an id paired with its display name.
///
/// Ids are unique within a single source's table; the `(source, id)` pair
/// is the addressable unit. Names are opaque keys to the runtime, used only
/// for filter matching and pass-through to sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatDesc {
    pub id: u64,
    pub name: String,
}

impl StatDesc {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        StatDesc { id, name: name.into() }
    }
}

/// Truncate a name to [`MAX_STAT_NAME_LEN`] bytes on a char boundary.
pub(crate) fn clamp_name(mut name: String) -> String {
    if name.len() > MAX_STAT_NAME_LEN {
        let mut cut = MAX_STAT_NAME_LEN;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    name
}

/// One source's worth of sampled data, handed to each sink in turn during a
/// sampling pass.
///
/// `ids` and `values` are index-parallel, as is `names` when present. Sinks
/// registered with [`SinkFlags::NO_NAMES`](crate::SinkFlags::NO_NAMES)
/// receive `None` from [`names`](Self::names) but can still resolve
/// individual ids through [`lookup_name`](Self::lookup_name).
pub struct SampleBatch<'a> {
    source_name: &'a str,
    source_id: u16,
    names: Option<&'a [String]>,
    ids: &'a [u64],
    values: &'a [u64],
    table_names: &'a [String],
    table_ids: &'a [u64],
}

impl<'a> SampleBatch<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        source_name: &'a str,
        source_id: u16,
        names: Option<&'a [String]>,
        ids: &'a [u64],
        values: &'a [u64],
        table_names: &'a [String],
        table_ids: &'a [u64],
    ) -> Self {
        SampleBatch {
            source_name,
            source_id,
            names,
            ids,
            values,
            table_names,
            table_ids,
        }
    }

    /// Display name of the source this batch came from.
    pub fn source_name(&self) -> &str {
        self.source_name
    }

    /// Numeric id of the source this batch came from.
    pub fn source_id(&self) -> u16 {
        self.source_id
    }

    /// Stat names parallel to [`ids`](Self::ids), or `None` for sinks that
    /// opted out of name delivery.
    pub fn names(&self) -> Option<&[String]> {
        self.names
    }

    /// The stat ids sampled this pass, in cache order.
    pub fn ids(&self) -> &[u64] {
        self.ids
    }

    /// The sampled values, parallel to [`ids`](Self::ids).
    pub fn values(&self) -> &[u64] {
        self.values
    }

    /// Number of stats in the batch.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// On-demand name lookup against the source's full cached table.
    ///
    /// Works regardless of the no-names flag; linear scan.
    pub fn lookup_name(&self, id: u64) -> Option<&str> {
        self.table_ids
            .iter()
            .position(|&cached| cached == id)
            .map(|i| self.table_names[i].as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_name_short_names_untouched() {
        assert_eq!(clamp_name("rx_bytes".to_owned()), "rx_bytes");
    }

    #[test]
    fn test_clamp_name_truncates_long_names() {
        let long = "x".repeat(300);
        let clamped = clamp_name(long);
        assert_eq!(clamped.len(), MAX_STAT_NAME_LEN);
    }

    #[test]
    fn test_clamp_name_respects_char_boundaries() {
        // 63 two-byte chars = 126 bytes, one more lands on byte 128.
        let long = "é".repeat(70);
        let clamped = clamp_name(long);
        assert!(clamped.len() <= MAX_STAT_NAME_LEN);
        assert_eq!(clamped.len() % 2, 0);
    }

    #[test]
    fn test_batch_lookup_name_ignores_projection() {
        let table_names = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        let table_ids = vec![10, 20, 30];
        let ids = vec![10, 30];
        let values = vec![1, 3];
        let batch = SampleBatch::new("src", 0, None, &ids, &values, &table_names, &table_ids);

        assert_eq!(batch.lookup_name(20), Some("b"));
        assert_eq!(batch.lookup_name(30), Some("c"));
        assert_eq!(batch.lookup_name(99), None);
        assert!(batch.names().is_none());
        assert_eq!(batch.len(), 2);
    }
}
