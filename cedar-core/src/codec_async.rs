/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! Async record read/write shared by the handshake phase (a bare
//! `TcpStream`, not yet attached to any bundle) and the long-lived fiber
//! reader/writer tasks (a split `OwnedReadHalf`/`OwnedWriteHalf`).

use cedar_crypto::{decode_head, decode_rest, encode_record, CodecError, KeySchedule, HEAD_ON_WIRE_LEN};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub(crate) async fn read_record_async<R: AsyncRead + Unpin>(
    stream: &mut R,
    keys: &KeySchedule,
) -> Result<Vec<u8>, CodecError> {
    let mut head_bytes = [0u8; HEAD_ON_WIRE_LEN];
    stream.read_exact(&mut head_bytes).await.map_err(CodecError::Io)?;
    let head = decode_head(keys, &head_bytes)?;

    let mut rest = vec![0u8; head.remaining_len()];
    stream.read_exact(&mut rest).await.map_err(CodecError::Io)?;

    decode_rest(keys, head, rest)
}

pub(crate) async fn write_record_async<W: AsyncWrite + Unpin>(
    stream: &mut W,
    keys: &KeySchedule,
    plaintext: &[u8],
) -> Result<(), CodecError> {
    let buf = encode_record(keys, plaintext);
    stream.write_all(&buf).await.map_err(CodecError::Io)?;
    Ok(())
}
