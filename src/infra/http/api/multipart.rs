//! Minimal `multipart/form-data` writer for responses.

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

pub struct MultipartWriter {
    boundary: String,
    buffer: BytesMut,
}

impl MultipartWriter {
    pub fn new() -> Self {
        Self {
            boundary: format!("pressroom-{}", Uuid::new_v4().simple()),
            buffer: BytesMut::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.open_part();
        self.put(&format!(
            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
            quote(name)
        ));
        self.put(value);
        self.put("\r\n");
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.open_part();
        self.put(&format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            quote(name),
            quote(file_name),
            content_type
        ));
        self.buffer.put_slice(data);
        self.put("\r\n");
        self
    }

    /// Returns the `Content-Type` header value and the encoded body.
    pub fn finish(mut self) -> (String, Bytes) {
        let closing = format!("--{}--\r\n", self.boundary);
        self.put(&closing);
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.buffer.freeze(),
        )
    }

    fn open_part(&mut self) {
        let delimiter = format!("--{}\r\n", self.boundary);
        self.put(&delimiter);
    }

    fn put(&mut self, text: &str) {
        self.buffer.put_slice(text.as_bytes());
    }
}

impl Default for MultipartWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn quote(value: &str) -> String {
    value
        .chars()
        .filter(|ch| *ch != '\r' && *ch != '\n')
        .collect::<String>()
        .replace('"', "%22")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_are_delimited_and_closed() {
        let (content_type, body) = MultipartWriter::new()
            .file("bundle", "a\"b.zip", "application/zip", b"PK")
            .text("name", "invoice")
            .finish();

        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .expect("boundary");
        let body = String::from_utf8(body.to_vec()).expect("utf8");

        assert!(body.starts_with(&format!("--{boundary}\r\n")));
        assert!(body.contains("filename=\"a%22b.zip\""));
        assert!(body.contains("Content-Type: application/zip\r\n\r\nPK\r\n"));
        assert!(body.contains("name=\"name\"\r\n\r\ninvoice\r\n"));
        assert!(body.ends_with(&format!("--{boundary}--\r\n")));
    }
}
