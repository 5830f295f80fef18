/// Receives notifications from the tile manager when something new can be drawn.
pub trait Messenger: Send + Sync {
    /// Requests the host to redraw the map.
    fn request_redraw(&self);
}
