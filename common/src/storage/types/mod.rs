pub mod expansion;
pub mod lookup_key;
pub mod pair_row;

pub use expansion::{ExpansionResult, ImpureTuple, PureTuple};
pub use lookup_key::{ExpansionKind, LookupKey};
pub use pair_row::{PairId, PairRow, PairTable};
