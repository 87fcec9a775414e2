/// Readable half of a child's output pipe (stdout or stderr).
pub trait ReadableStream {
    fn is_readable(&self) -> bool;

    /// Register a listener fired once when the stream reaches end-of-stream.
    ///
    /// Implementations must report `is_readable() == false` and release any
    /// internal borrows before invoking listeners, since listeners re-query
    /// the stream.
    fn on_end(&mut self, listener: Box<dyn FnMut()>);

    /// Close the stream. Infallible at this interface: implementations
    /// handle their own I/O errors, so a failing close on one stream never
    /// blocks closing the others. Idempotent.
    fn close(&mut self);
}

/// Writable half of the child's stdin pipe.
pub trait WritableStream {
    /// See [`ReadableStream::close`].
    fn close(&mut self);
}
