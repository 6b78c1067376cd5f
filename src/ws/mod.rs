pub mod actor;
pub mod writer;

pub use actor::{
    Connect, ConnectionActor, ConnectionActorArgs, Disconnect, GetConnectionStats, SendFrame,
};
pub use writer::{BatchWriteError, FrameWriter, WriterClose, WriterWrite, WriterWriteBatch};
