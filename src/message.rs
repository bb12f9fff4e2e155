use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::net::TcpStream;

use protobuf::Message;

/// Chunk size for raw (non-protobuf) buffer transfers — ciphertext vectors
/// and the garbled decision tree are sent/received in fixed windows rather
/// than in one `write`/`read` call, mirroring the original's socket-channel
/// buffering.
pub const WINDOWSIZE: usize = 50_000;

/// Length-prefixed protobuf framing over a `TcpStream`. Every control
/// message (key exchange, OT rounds, results) is a 4-byte big-endian length
/// followed by that many bytes of an encoded protobuf message.
pub struct MessageStream<T> {
    _marker: PhantomData<T>,
}

impl<T: Message> MessageStream<T> {
    pub fn send_msg(stream: &mut TcpStream, msg: T) -> io::Result<()> {
        let bytes = msg
            .write_to_bytes()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        stream.write_all(&(bytes.len() as u32).to_be_bytes())?;
        stream.write_all(&bytes)?;
        stream.flush()
    }

    pub fn receive_msg(stream: &mut TcpStream) -> io::Result<T> {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf)?;

        T::parse_from_bytes(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Send a raw byte buffer in `WINDOWSIZE` chunks, with no length prefix —
/// the receiver must already know (from the negotiated parameters) how many
/// bytes to expect.
pub fn send_windowed(stream: &mut TcpStream, data: &[u8]) -> io::Result<()> {
    for chunk in data.chunks(WINDOWSIZE) {
        stream.write_all(chunk)?;
    }
    stream.flush()
}

/// Receive exactly `len` bytes in `WINDOWSIZE` chunks.
pub fn receive_windowed(stream: &mut TcpStream, len: usize) -> io::Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    let mut received = 0;

    while received < len {
        let end = (received + WINDOWSIZE).min(len);
        stream.read_exact(&mut out[received..end])?;
        received = end;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windowed_round_trip_over_a_pipe() {
        use std::net::{TcpListener, TcpStream};
        use std::thread;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let data = vec![0xABu8; WINDOWSIZE * 3 + 17];
        let expected = data.clone();

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            send_windowed(&mut sock, &data).unwrap();
        });

        let mut client = TcpStream::connect(addr).unwrap();
        let received = receive_windowed(&mut client, expected.len()).unwrap();

        server.join().unwrap();
        assert_eq!(received, expected);
    }
}
