//! Client for cameras serving an HTTP MJPEG stream (`multipart/x-mixed-replace`).
//!
//! This is what the ESP32-CAM `CameraWebServer` firmware exposes at `http://<ip>:81/stream`.

use std::{
    io::{self, prelude::*, BufReader},
    time::Duration,
};

use anyhow::{bail, Context};
use image::RgbImage;
use reqwest::{
    blocking::{Client, Response},
    header::{ACCEPT, CONTENT_TYPE},
};

use crate::{image::decode_jpeg, timer::Timer};

use super::FrameSource;

/// A stalled stream is treated as a failed read after this long.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest accepted part. ESP32-CAM frames are a few hundred KiB at most.
const MAX_PART_BYTES: usize = 16 * 1024 * 1024;

pub struct HttpStream {
    parts: Parts<BufReader<Response>>,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl HttpStream {
    /// Connects to `host:port` and requests the stream at `path`.
    pub fn connect(host: &str, port: u16, path: &str) -> anyhow::Result<Self> {
        let url = if host.contains(':') {
            format!("http://[{host}]:{port}{path}")
        } else {
            format!("http://{host}:{port}{path}")
        };

        // The blocking client applies the timeout to each read of the body, not the whole stream.
        let client = Client::builder().timeout(READ_TIMEOUT).build()?;
        let response = client
            .get(&url)
            .header(ACCEPT, "multipart/x-mixed-replace")
            .send()
            .with_context(|| format!("failed to connect to {url}"))?
            .error_for_status()?;

        let Some(content_type) = response.headers().get(CONTENT_TYPE) else {
            bail!("missing `Content-Type` header");
        };
        let boundary = parse_boundary(content_type.to_str()?)?;
        log::trace!("multipart boundary: {boundary}");

        let parts = Parts::new(BufReader::new(response), boundary)?;
        log::info!("receiving MJPEG stream from {url}");

        Ok(Self {
            parts,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        })
    }
}

impl FrameSource for HttpStream {
    fn read(&mut self) -> anyhow::Result<Option<RgbImage>> {
        let Some(jpeg) = self.t_dequeue.time(|| self.parts.next())? else {
            log::info!("MJPEG stream ended");
            return Ok(None);
        };
        let image = self.t_decode.time(|| decode_jpeg(&jpeg))?;
        Ok(Some(image))
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }
}

/// Extracts the part delimiter from a `multipart/x-mixed-replace` content type.
fn parse_boundary(content_type: &str) -> anyhow::Result<String> {
    let Some((mime, params)) = content_type.split_once(';') else {
        bail!("malformed Content-Type header: {content_type}");
    };
    if !mime.trim().eq_ignore_ascii_case("multipart/x-mixed-replace") {
        bail!("unexpected Content-Type {}", mime.trim());
    }
    let Some(bnd) = params
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("boundary="))
        .next()
    else {
        bail!("malformed Content-Type header (missing boundary)");
    };

    let bnd = bnd.trim_matches('"');
    // Some servers include the `--` in the boundary parameter, which the MIME spec doesn't allow.
    if bnd.starts_with("--") {
        Ok(bnd.to_string())
    } else {
        Ok(format!("--{bnd}"))
    }
}

/// Iterates over the bodies of a multipart stream.
struct Parts<R> {
    reader: R,
    boundary: String,
    done: bool,
}

impl<R: BufRead> Parts<R> {
    fn new(reader: R, boundary: String) -> anyhow::Result<Self> {
        let mut this = Self {
            reader,
            boundary,
            done: false,
        };
        if !this.read_until_boundary()? {
            bail!("stream ended before the first part");
        }
        Ok(this)
    }

    /// Reads the next part's body, or returns `None` at the end of the stream.
    fn next(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }

        let mut length = None;
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                break;
            }
            log::trace!("multipart header: {}", line.trim());
            let Some((key, value)) = line.split_once(':') else {
                bail!("malformed multipart header: {}", line.trim());
            };
            let value = value.trim();
            if key.eq_ignore_ascii_case("Content-Type") && value != "image/jpeg" {
                bail!("unexpected Content-Type: expected image/jpeg, got {value}");
            }
            if key.eq_ignore_ascii_case("Content-Length") {
                length = Some(value.parse::<usize>()?);
            }
        }

        let Some(length) = length else {
            bail!("missing Content-Length header");
        };
        if length > MAX_PART_BYTES {
            bail!("part of {length} bytes exceeds the limit of {MAX_PART_BYTES} bytes");
        }
        let mut buf = vec![0; length];
        self.reader.read_exact(&mut buf)?;
        if !self.read_until_boundary()? {
            self.done = true;
        }
        Ok(Some(buf))
    }

    /// Skips to the next boundary line. Returns `false` if the stream ended instead.
    fn read_until_boundary(&mut self) -> io::Result<bool> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(false);
            }
            let line = line.trim();
            if line == self.boundary {
                return Ok(true);
            }
            if line.strip_suffix("--") == Some(self.boundary.as_str()) {
                return Ok(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Cursor,
        net::{Shutdown, TcpListener},
        thread,
    };

    use image::ImageFormat;

    use super::*;

    const BOUNDARY: &str = "123456789000000000000987654321";

    fn part(data: &[u8]) -> Vec<u8> {
        let mut part = format!("\r\n--{BOUNDARY}\r\n").into_bytes();
        part.extend_from_slice(
            format!(
                "Content-Type: image/jpeg\r\nContent-Length: {}\r\nX-Timestamp: 1.000\r\n\r\n",
                data.len()
            )
            .as_bytes(),
        );
        part.extend_from_slice(data);
        part
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        RgbImage::new(width, height)
            .write_to(&mut buf, ImageFormat::Jpeg)
            .unwrap();
        buf.into_inner()
    }

    /// Accepts one connection, consumes the request head, then writes `response` and hangs up.
    fn serve_once(response: Vec<u8>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(conn.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                line.clear();
            }
            conn.write_all(&response).unwrap();
            conn.shutdown(Shutdown::Write).ok();
            // Let the client finish reading before the socket is closed.
            let _ = io::copy(&mut reader, &mut io::sink());
        });
        port
    }

    #[test]
    fn boundary() {
        assert_eq!(
            parse_boundary("multipart/x-mixed-replace;boundary=frame").unwrap(),
            "--frame"
        );
        assert_eq!(
            parse_boundary("multipart/x-mixed-replace; boundary=--frame").unwrap(),
            "--frame"
        );
        assert_eq!(
            parse_boundary("multipart/x-mixed-replace; charset=x; boundary=\"frame\"").unwrap(),
            "--frame"
        );
        parse_boundary("image/jpeg").unwrap_err();
        parse_boundary("multipart/form-data; boundary=x").unwrap_err();
        parse_boundary("multipart/x-mixed-replace; charset=x").unwrap_err();
    }

    #[test]
    fn reads_parts_until_eof() {
        let mut body = Vec::new();
        body.extend(part(b"first"));
        body.extend(part(b"second\r\n--not-a-boundary"));
        body.extend(format!("\r\n--{BOUNDARY}\r\n").as_bytes());

        let mut parts = Parts::new(Cursor::new(body), format!("--{BOUNDARY}")).unwrap();
        assert_eq!(parts.next().unwrap().unwrap(), b"first");
        assert_eq!(
            parts.next().unwrap().unwrap(),
            b"second\r\n--not-a-boundary"
        );
        assert_eq!(parts.next().unwrap(), None);
    }

    #[test]
    fn closing_boundary_ends_stream() {
        let mut body = part(b"only");
        body.extend(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let mut parts = Parts::new(Cursor::new(body), format!("--{BOUNDARY}")).unwrap();
        assert_eq!(parts.next().unwrap().unwrap(), b"only");
        assert_eq!(parts.next().unwrap(), None);
        assert_eq!(parts.next().unwrap(), None);
    }

    #[test]
    fn missing_content_length() {
        let body = "--frame\r\nContent-Type: image/jpeg\r\n\r\nabc\r\n--frame\r\n";
        let mut parts = Parts::new(Cursor::new(body), "--frame".into()).unwrap();
        let err = parts.next().unwrap_err();
        assert!(err.to_string().contains("Content-Length"), "{err}");
    }

    #[test]
    fn oversized_part() {
        let body = "--frame\r\n\
            Content-Type: image/jpeg\r\n\
            Content-Length: 100000000000000\r\n\r\n\
            abc\r\n--frame\r\n";
        let mut parts = Parts::new(Cursor::new(body), "--frame".into()).unwrap();
        let err = parts.next().unwrap_err();
        assert!(err.to_string().contains("exceeds the limit"), "{err}");
    }

    #[test]
    fn chunked_stream() {
        let mut body = part(&jpeg(16, 8));
        body.extend(part(&jpeg(8, 8)));
        body.extend(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let mut response = format!(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: multipart/x-mixed-replace;boundary={BOUNDARY}\r\n\
             Transfer-Encoding: chunked\r\n\
             Connection: close\r\n\r\n"
        )
        .into_bytes();
        // Uneven chunks, some cutting through header lines.
        for piece in body.chunks(7) {
            response.extend(format!("{:x}\r\n", piece.len()).as_bytes());
            response.extend(piece);
            response.extend(b"\r\n");
        }
        response.extend(b"0\r\n\r\n");

        let port = serve_once(response);
        let mut stream = HttpStream::connect("127.0.0.1", port, "/stream").unwrap();
        assert_eq!(stream.read().unwrap().unwrap().dimensions(), (16, 8));
        assert_eq!(stream.read().unwrap().unwrap().dimensions(), (8, 8));
        assert!(stream.read().unwrap().is_none());
        assert_eq!(stream.timers().len(), 2);
    }

    #[test]
    fn error_status() {
        let port = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
        );
        let err = HttpStream::connect("127.0.0.1", port, "/stream")
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("404"), "{err:#}");
    }

    #[test]
    fn not_a_stream() {
        let port = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 0\r\n\
              Connection: close\r\n\r\n"
                .to_vec(),
        );
        let err = HttpStream::connect("127.0.0.1", port, "/").err().unwrap();
        assert!(err.to_string().contains("text/html"), "{err}");
    }
}
