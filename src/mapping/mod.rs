// ABOUTME: RGB-D mapping transport — client streams frames, server fans them out per connection
// ABOUTME: Mirrors smg.comms.mapping

mod client;
mod handler;
mod server;

pub use client::{FrameCompressor, MappingClient, MappingClientBuilder};
pub use handler::{FrameDecompressor, MappingClientHandler, MAX_IMAGES, SERVER_QUEUE_CAPACITY};
pub use server::{MappingServer, MappingServerBuilder};
