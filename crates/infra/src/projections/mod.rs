//! Projection implementations (read model builders, spec §4.G) and the
//! dispatcher that drives them (spec §4.F).

pub mod dispatcher;
pub mod relational;
pub mod search;

pub use dispatcher::{ProjectionDispatcher, ProjectorSet};
pub use relational::{
    CanisterRelationalProjector, CanisterRow, DeliveryItemRow, DeliveryNoteRow, DeliveryRelationalProjector,
    ProjectionError, RelationalProjector,
};
pub use search::{
    CanisterDoc, CanisterSearchProjector, DeliveryItemDoc, DeliveryNoteDoc, DeliverySearchProjector, EventDoc,
    SearchIndexProjector,
};
