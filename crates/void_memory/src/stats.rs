//! Allocation counters and the nested report built from them
//!
//! Every concrete allocator keeps an [`AllocatorStats`]. Asking a composed
//! allocator for its [`StatsReport`] yields a tree mirroring the composition:
//! proxies (fallback, segregator) contribute only their children, while
//! allocators that hand out memory themselves contribute their own counters.

use core::fmt;

use serde::Serialize;

/// Counters for a single allocator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AllocatorStats {
    /// Allocator kind, e.g. `"StackAllocator"`
    pub name: &'static str,
    /// Successful allocations served by this allocator itself
    pub count_allocated: u64,
    /// Bytes handed out by those allocations
    pub total_allocated: u64,
    /// Deallocations absorbed by this allocator itself
    pub count_deallocated: u64,
    /// Bytes returned by those deallocations
    pub total_deallocated: u64,
}

impl AllocatorStats {
    /// Fresh counters for the named allocator
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            count_allocated: 0,
            total_allocated: 0,
            count_deallocated: 0,
            total_deallocated: 0,
        }
    }

    #[inline]
    pub fn record_allocation(&mut self, size: usize) {
        self.count_allocated += 1;
        self.total_allocated += size as u64;
    }

    #[inline]
    pub fn record_deallocation(&mut self, size: usize) {
        self.count_deallocated += 1;
        self.total_deallocated += size as u64;
    }

    /// Bytes allocated and not yet returned
    pub fn outstanding_bytes(&self) -> u64 {
        self.total_allocated.saturating_sub(self.total_deallocated)
    }
}

/// Statistics tree for a composed allocator
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    /// Proxies route requests but never own memory themselves
    pub is_proxy: bool,
    pub stats: AllocatorStats,
    pub nested: Vec<StatsReport>,
}

impl StatsReport {
    /// Report for an allocator with no children
    pub fn leaf(stats: AllocatorStats) -> Self {
        Self {
            is_proxy: false,
            stats,
            nested: Vec::new(),
        }
    }

    /// Report for an allocator that counts its own traffic and wraps a child
    pub fn decorator(stats: AllocatorStats, child: StatsReport) -> Self {
        Self {
            is_proxy: false,
            stats,
            nested: vec![child],
        }
    }

    /// Report for a routing allocator
    pub fn proxy(name: &'static str, children: Vec<StatsReport>) -> Self {
        Self {
            is_proxy: true,
            stats: AllocatorStats::new(name),
            nested: children,
        }
    }

    /// Sum of allocated and deallocated bytes over every non-proxy node
    pub fn totals(&self) -> (u64, u64) {
        let own = if self.is_proxy {
            (0, 0)
        } else {
            (self.stats.total_allocated, self.stats.total_deallocated)
        };
        self.nested.iter().fold(own, |(a, d), child| {
            let (ca, cd) = child.totals();
            (a + ca, d + cd)
        })
    }

    /// Depth-first search for the first node with the given name
    pub fn find(&self, name: &str) -> Option<&StatsReport> {
        if self.stats.name == name {
            return Some(self);
        }
        self.nested.iter().find_map(|child| child.find(name))
    }

    /// Serialise the report as pretty JSON
    pub fn to_json(&self) -> String {
        // A tree of plain integers and static strings always serialises
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    fn write_node(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "    ".repeat(depth);
        let inner = "    ".repeat(depth + 1);
        let s = &self.stats;

        writeln!(f, "{indent}{}", s.name)?;
        writeln!(f, "{indent}{{")?;
        if !self.is_proxy {
            writeln!(f, "{inner}-----------------------------------------")?;
            writeln!(f, "{inner}|       |  total  |   bytes   |   MiB   |")?;
            writeln!(
                f,
                "{inner}|Alloc  |{:>9}|{:>11}|{:>9}|",
                s.count_allocated,
                s.total_allocated,
                to_mib(s.total_allocated)
            )?;
            writeln!(
                f,
                "{inner}|Dealloc|{:>9}|{:>11}|{:>9}|",
                s.count_deallocated,
                s.total_deallocated,
                to_mib(s.total_deallocated)
            )?;
            writeln!(f, "{inner}-----------------------------------------")?;
        }
        for child in &self.nested {
            child.write_node(f, depth + 1)?;
        }
        writeln!(f, "{indent}}}")
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_node(f, 0)?;
        let (allocated, deallocated) = self.totals();
        writeln!(f, "Total allocated memory:   {} bytes ({} MiB)", allocated, to_mib(allocated))?;
        writeln!(f, "Total deallocated memory: {} bytes ({} MiB)", deallocated, to_mib(deallocated))?;
        write!(f, "Difference: {} bytes", allocated.saturating_sub(deallocated))
    }
}

fn to_mib(bytes: u64) -> u64 {
    bytes >> 20
}
