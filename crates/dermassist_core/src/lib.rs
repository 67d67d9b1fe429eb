pub mod domain;
pub mod ids;
pub mod persisted;
pub mod ports;
pub mod presentation;
pub mod protocol;
pub mod reducer;
pub mod sync;

pub use domain::{
    ChatMessage, DiagnosisResult, DoctorData, ImageHandle, MessageId, MessagePatch, MessageType,
    PhysicianButtonState, SenderType, SharedChatEntry, SharedMessage, UserInfo, UserProfile,
    ViewState,
};
pub use ids::MessageIdGenerator;
pub use ports::{
    DiagnosisService, KeyValueStorage, PortError, PortResult, ProgressSink, StorageEvent,
    StorageEvents,
};
pub use reducer::{reduce, Action};
