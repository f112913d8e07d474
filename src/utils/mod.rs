pub mod aggregation;

pub use aggregation::{CommitMap, EmailSet, YearMonthCount, YearlyEmailMap, YearlyLineChangeMap};
