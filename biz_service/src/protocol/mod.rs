pub mod msg;

use crate::biz_service::session_sink::SendError;
use crate::entitys::message_entity::{MessageEnvelope, SendReceipt, UndeliverableNotice};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use common::AppError;
use msg::{ByteMessageType, MessageEnvelopeMsg, SendReceiptMsg, UndeliverableMsg};
use prost::Message;

/// 编码一个帧：1 字节类型 + protobuf 消息体，长度前缀由 LengthDelimitedCodec 负责
pub fn encode_frame<M: Message>(msg_type: ByteMessageType, msg: &M) -> Result<Bytes, SendError> {
    let mut buf = BytesMut::with_capacity(1 + msg.encoded_len());
    buf.put_u8(msg_type as i32 as u8);
    msg.encode(&mut buf)?;
    Ok(buf.freeze())
}

/// 拆出帧类型与消息体
pub fn decode_frame(mut frame: Bytes) -> Result<(ByteMessageType, Bytes), AppError> {
    if frame.is_empty() {
        return Err(AppError::Validation("empty frame".to_string()));
    }
    let type_code = frame.get_u8();
    let msg_type = ByteMessageType::try_from(type_code as i32).unwrap_or(ByteMessageType::UnknownByteMessageType);
    Ok((msg_type, frame))
}

impl From<&MessageEnvelope> for MessageEnvelopeMsg {
    fn from(envelope: &MessageEnvelope) -> Self {
        Self {
            sender_id: envelope.sender_id.clone(),
            recipient_id: envelope.recipient_id.clone(),
            group_id: envelope.group_id.clone().unwrap_or_default(),
            sequence: envelope.sequence,
            payload: envelope.payload.clone(),
            sent_at: envelope.sent_at,
        }
    }
}

impl From<&SendReceipt> for SendReceiptMsg {
    fn from(receipt: &SendReceipt) -> Self {
        Self {
            message_id: receipt.message_id.clone(),
            recipient_id: receipt.recipient_id.clone(),
            sequence: receipt.sequence,
            status: receipt.status.to_string(),
        }
    }
}

impl From<&UndeliverableNotice> for UndeliverableMsg {
    fn from(notice: &UndeliverableNotice) -> Self {
        Self {
            message_id: notice.message_id.clone(),
            recipient_id: notice.recipient_id.clone(),
            sequence: notice.sequence,
            client_token: notice.client_token.clone(),
            attempts: notice.attempts,
            reason: notice.reason.clone(),
        }
    }
}
