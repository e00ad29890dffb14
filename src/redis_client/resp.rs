//! Minimal RESP (REdis Serialization Protocol) encode/decode — just enough
//! to issue the fixed command vocabulary of §4.2 and parse its replies.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Encodes a command as a RESP array of bulk strings, the wire form every
/// modern Redis/Sentinel server accepts regardless of argument content.
pub fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<String>),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    pub fn into_bulk_string(self) -> Option<String> {
        match self {
            Reply::Bulk(s) => s,
            Reply::Simple(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Reply>> {
        match self {
            Reply::Array(items) => items,
            _ => None,
        }
    }
}

/// Parses one reply, recursing into nested arrays. Written as a plain `fn`
/// returning a boxed future (rather than `async fn`) because the recursive
/// call would otherwise produce an infinitely-sized anonymous future type.
pub fn read_reply<'a, R: AsyncBufRead + Unpin + Send + 'a>(
    reader: &'a mut R,
) -> Pin<Box<dyn Future<Output = std::io::Result<Reply>> + Send + 'a>> {
    Box::pin(async move {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "empty reply line"));
        }
        let (prefix, rest) = line.split_at(1);
        match prefix {
            "+" => Ok(Reply::Simple(rest.to_string())),
            "-" => Ok(Reply::Error(rest.to_string())),
            ":" => {
                let n = rest
                    .parse::<i64>()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                Ok(Reply::Integer(n))
            }
            "$" => {
                let len = rest
                    .parse::<i64>()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                if len < 0 {
                    return Ok(Reply::Bulk(None));
                }
                let mut data = vec![0u8; len as usize + 2];
                reader.read_exact(&mut data).await?;
                data.truncate(len as usize);
                Ok(Reply::Bulk(Some(String::from_utf8_lossy(&data).into_owned())))
            }
            "*" => {
                let len = rest
                    .parse::<i64>()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                if len < 0 {
                    return Ok(Reply::Array(None));
                }
                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    items.push(read_reply(reader).await?);
                }
                Ok(Reply::Array(Some(items)))
            }
            other => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unrecognized RESP prefix: {other}"),
            )),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn parses_simple_error_integer_bulk_and_array() {
        let input = b"+OK\r\n-ERR boom\r\n:42\r\n$5\r\nhello\r\n$-1\r\n*2\r\n:1\r\n:2\r\n".to_vec();
        let mut reader = BufReader::new(&input[..]);
        assert_eq!(read_reply(&mut reader).await.unwrap(), Reply::Simple("OK".into()));
        assert_eq!(read_reply(&mut reader).await.unwrap(), Reply::Error("ERR boom".into()));
        assert_eq!(read_reply(&mut reader).await.unwrap(), Reply::Integer(42));
        assert_eq!(read_reply(&mut reader).await.unwrap(), Reply::Bulk(Some("hello".into())));
        assert_eq!(read_reply(&mut reader).await.unwrap(), Reply::Bulk(None));
        assert_eq!(
            read_reply(&mut reader).await.unwrap(),
            Reply::Array(Some(vec![Reply::Integer(1), Reply::Integer(2)]))
        );
    }

    #[test]
    fn encodes_command_as_resp_array() {
        let out = encode_command(&["SET", "foo", "bar"]);
        assert_eq!(out, b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
    }
}
