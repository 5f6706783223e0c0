pub mod catalog;
pub mod protocol;
pub mod provenance;

pub use catalog::{
    parse_listing, select_focus, FocusChange, FunctionCatalog, FunctionId, FunctionListing,
    FALLBACK_FOCUS,
};
pub use protocol::{
    Decompilation, FrameError, Reply, ReplyOutput, RequestId, RequestPayload,
    DEFAULT_MAX_FRAME_BYTES,
};
pub use provenance::{AddressPair, ProvenanceGroup, ProvenanceGroups, ProvenanceIndex};
