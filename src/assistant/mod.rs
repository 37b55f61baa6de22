//! The chat pipeline: gateway call, reply contract, action dispatch.

pub mod contract;
pub mod dispatch;
pub mod gateway;
pub mod timing;

pub use contract::{AiResponse, CalendarEventDraft, ContractError, EventDateTime, TaskDraft};
pub use dispatch::{DispatchError, DispatchOutcome, DispatchSettings, Dispatcher};
pub use gateway::{AssistantGateway, GatewaySettings};
