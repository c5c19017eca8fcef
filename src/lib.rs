// risk-core: position & margin risk engine for leveraged derivatives.
// tracks open positions and keeps unrealized pnl, margin, liquidation and
// bankruptcy prices bit-exact as market and account events arrive.
// all computation is deterministic decimal arithmetic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Symbol, AccountId, Side, SignedQty, Price, Leverage
//   2.x  errors.rs: RiskError, the only failure surface
//   3.x  formulas.rs: linear/inverse strategy trait: value, pnl, margin,
//        liquidation price, bankruptcy price, fees
//   4.x  position.rs: position entity, raw update / derived recompute split
//   5.x  funding.rs: per-symbol funding/market context + tear-free snapshots
//   6.x  snapshot.rs: the published record, serialization boundary
//   7.x  events.rs: inbound market/fill events, outbound audit log
//   8.x  engine/: position book, update protocol, per-position locking

pub mod contract;
pub mod engine;
pub mod errors;
pub mod events;
pub mod formulas;
pub mod funding;
pub mod position;
pub mod snapshot;
pub mod types;

pub use contract::{ContractDescriptor, ContractType, MarginMode, MarginTier};
pub use engine::{EngineConfig, PositionKey, RiskEngine};
pub use errors::RiskError;
pub use events::{
    Event, EventId, EventPayload, FillEvent, FundingRateEvent, MarkPriceEvent,
    PositionClosedEvent, PositionLiquidatedEvent, PositionOpenedEvent,
};
pub use formulas::{ContractFormulas, InverseFormulas, LinearFormulas};
pub use funding::{FundingContext, FundingSnapshot};
pub use position::{Position, PositionDelta, PositionState};
pub use snapshot::PositionSnapshot;
pub use types::{AccountId, Leverage, Price, Side, SignedQty, Symbol, Timestamp};
