//! Chain-length statistics.

use core::fmt;

use crate::dict::Dict;
use crate::dict_type::DictType;

/// Bins of [`TableStats::histogram`]. The last bin collects every chain of
/// at least `STATS_BINS - 1` entries.
pub const STATS_BINS: usize = 50;

/// Shape of one bucket array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    /// 0 for the main table, 1 for the rehash target.
    pub table_id: usize,
    /// Number of buckets.
    pub size: usize,
    /// Number of entries.
    pub used: usize,
    /// Number of non-empty buckets.
    pub slots: usize,
    /// Longest chain.
    pub max_chain_len: usize,
    /// Sum of all chain lengths, counted by walking the chains.
    pub total_chain_len: usize,
    /// Buckets per chain length; bin 0 counts empty buckets.
    pub histogram: [usize; STATS_BINS],
}

impl TableStats {
    /// Average length of the non-empty chains, from the walked total.
    pub fn avg_chain_len_counted(&self) -> f64 {
        ratio(self.total_chain_len, self.slots)
    }

    /// Average length of the non-empty chains, from the entry count.
    pub fn avg_chain_len_computed(&self) -> f64 {
        ratio(self.used, self.slots)
    }

    /// Entries per bucket.
    pub fn load_factor(&self) -> f64 {
        ratio(self.used, self.size)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.used == 0 {
            return writeln!(f, "No stats available for empty dictionaries");
        }
        let role = if self.table_id == 0 {
            "main hash table"
        } else {
            "rehashing target"
        };
        writeln!(f, "Hash table {} stats ({role}):", self.table_id)?;
        writeln!(f, " table size: {}", self.size)?;
        writeln!(f, " number of elements: {}", self.used)?;
        writeln!(f, " different slots: {}", self.slots)?;
        writeln!(f, " max chain length: {}", self.max_chain_len)?;
        writeln!(f, " avg chain length (counted): {:.2}", self.avg_chain_len_counted())?;
        writeln!(f, " avg chain length (computed): {:.2}", self.avg_chain_len_computed())?;
        writeln!(f, " Chain length distribution:")?;
        for (len, &count) in self.histogram.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let prefix = if len == STATS_BINS - 1 { ">= " } else { "" };
            writeln!(
                f,
                "   {prefix}{len}: {count} ({:.2}%)",
                ratio(count, self.size) * 100.0
            )?;
        }
        Ok(())
    }
}

/// Statistics for a whole dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictStats {
    /// The main table.
    pub main: TableStats,
    /// The rehash target, present only while rehashing.
    pub rehash_target: Option<TableStats>,
}

impl DictStats {
    /// Pretty-prints the statistics to stdout.
    pub fn print(&self) {
        print!("{self}");
    }
}

impl fmt::Display for DictStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.main)?;
        if let Some(target) = &self.rehash_target {
            write!(f, "{target}")?;
        }
        Ok(())
    }
}

impl<K, V, T> Dict<K, V, T>
where
    K: PartialEq,
    T: DictType<K, V>,
{
    fn collect_table_stats(&self, table_id: usize) -> TableStats {
        let table = &self.tables[table_id];
        let mut stats = TableStats {
            table_id,
            size: table.size(),
            used: table.used,
            slots: 0,
            max_chain_len: 0,
            total_chain_len: 0,
            histogram: [0; STATS_BINS],
        };
        if table.used == 0 {
            return stats;
        }
        for bucket in 0..table.size() {
            let len = table.chain_len(&self.entries, bucket);
            stats.histogram[len.min(STATS_BINS - 1)] += 1;
            if len == 0 {
                continue;
            }
            stats.slots += 1;
            stats.max_chain_len = stats.max_chain_len.max(len);
            stats.total_chain_len += len;
        }
        stats
    }

    /// Walks every chain and collects per-table statistics.
    pub fn table_stats(&self) -> DictStats {
        DictStats {
            main: self.collect_table_stats(0),
            rehash_target: self.is_rehashing().then(|| self.collect_table_stats(1)),
        }
    }

    /// Human-readable chain statistics.
    ///
    /// ```rust
    /// use rehash_dict::Dict;
    /// use rehash_dict::HashKeys;
    ///
    /// let mut dict: Dict<u32, (), _> = Dict::new(HashKeys::new());
    /// assert_eq!(dict.stats(), "No stats available for empty dictionaries\n");
    /// dict.insert(1, ()).unwrap();
    /// assert!(dict.stats().starts_with("Hash table 0 stats (main hash table):\n"));
    /// ```
    pub fn stats(&self) -> String {
        self.table_stats().to_string()
    }
}
