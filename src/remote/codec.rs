use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::remote::envelope::WireEnvelope;
use crate::remote::WireError;

/// Maximum frame size, length prefix included: 16 MiB.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Encodes an envelope as `[len: u32 BE][json bytes]`.
pub fn encode_frame(env: &WireEnvelope) -> Result<Bytes, WireError> {
    let body = serde_json::to_vec(env).map_err(|e| WireError::MalformedFrame(e.to_string()))?;

    if body.len() > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(body.len()));
    }

    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Decodes the JSON body of a frame.
pub fn decode_frame(body: &[u8]) -> Result<WireEnvelope, WireError> {
    if body.is_empty() {
        return Err(WireError::MalformedFrame("zero-length frame".into()));
    }
    if body.len() > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(body.len()));
    }
    serde_json::from_slice(body).map_err(|e| WireError::MalformedFrame(e.to_string()))
}

/// Reads one frame.
///
/// Returns `Ok(None)` on a clean EOF at a frame boundary; any other
/// short read or malformed length raises.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<WireEnvelope>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(WireError::Io(e.to_string())),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(WireError::MalformedFrame("zero-length frame".into()));
    }
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| WireError::Io(e.to_string()))?;

    decode_frame(&body).map(Some)
}

/// Frames and writes one envelope, flushing the stream.
pub async fn write_frame<W>(writer: &mut W, env: &WireEnvelope) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(env)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| WireError::Io(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| WireError::Io(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::envelope::WireKind;

    #[test]
    fn frame_round_trip() {
        let env = WireEnvelope::user(
            "movie.tcp://s@h:9000/user/a".into(),
            "T".into(),
            serde_json::json!({ "v": 42 }),
            None,
        );

        let frame = encode_frame(&env).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);

        let back = decode_frame(&frame[4..]).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.kind, WireKind::UserMessage);
        assert_eq!(back.target_path, "movie.tcp://s@h:9000/user/a");
        assert_eq!(back.payload["v"], 42);
    }

    #[test]
    fn zero_length_is_malformed() {
        assert!(matches!(
            decode_frame(&[]),
            Err(WireError::MalformedFrame(_))
        ));
    }

    #[test]
    fn oversize_frame_is_rejected() {
        let env = WireEnvelope::user(
            "movie://s/user/a".into(),
            "T".into(),
            serde_json::Value::String("x".repeat(MAX_FRAME_LEN)),
            None,
        );
        assert!(matches!(
            encode_frame(&env),
            Err(WireError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn read_frame_handles_clean_eof() {
        let empty: &[u8] = &[];
        let mut reader = empty;
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_write_round_trip() {
        let env = WireEnvelope::heartbeat();
        let mut buf = Vec::new();
        write_frame(&mut buf, &env).await.unwrap();

        let mut reader = buf.as_slice();
        let back = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(back, env);
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }
}
