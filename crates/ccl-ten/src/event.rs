use ccl_collective::ChunkId;
use ccl_topology::LinkId;

/// An immutable record of one chunk traversing one link:
/// `receive_time = send_time + delay(link, chunk_size)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    pub link: LinkId,
    pub chunk: ChunkId,
    pub send_time: f64,
    pub receive_time: f64,
}
