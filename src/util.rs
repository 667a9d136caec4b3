use positioned_io2::ReadAt;

pub trait ReadAtExt {
    /// Like `read_exact_at`, but a short read at EOF is not an error. Returns the number of bytes
    /// actually filled.
    fn read_up_to_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize>;
}

impl<R: ReadAt + ?Sized> ReadAtExt for R {
    fn read_up_to_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut total_read = 0;
        while total_read < buf.len() {
            match self.read_at(offset + total_read as u64, &mut buf[total_read..]) {
                Ok(0) => break, // EOF
                Ok(n) => total_read += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total_read)
    }
}
