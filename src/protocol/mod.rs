//! Bridge wire model: vehicle records, status records, commands and topics

pub mod command;
pub mod topics;
pub mod vehicle;

pub use command::{Command, CommandAction, CommandParser, ParseError, RawCommand};
pub use topics::TopicBuilder;
pub use vehicle::{find_by_vin, StatusRecord, VehicleId, VehicleRecord};
