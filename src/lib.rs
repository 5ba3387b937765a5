pub mod config;
pub mod engine;
pub mod logging;

pub use config::EngineConfig;
pub use engine::{
    Abstract, Action, Decision, Descriptor, DescriptorError, Engine, Handle, Kind, Node, PointerLike,
    TypeId, WalkError, WalkFn, Walked,
};
