use crate::socket::socket_sink::SocketSink;
use anyhow::{Result, anyhow};
use biz_service::biz_service::chat_service::{ChatService, ClientCommand, ClientReply};
use biz_service::biz_service::session_sink::SendError;
use biz_service::entitys::message_entity::ChatTarget;
use biz_service::manager::common::{ConnectionId, DeviceType};
use biz_service::protocol::msg::{
    AckMsg, ByteMessageType, ErrorRespMsg, FriendOp, FriendOpReq, FriendOpResp, HeartbeatMsg, LoginReqMsg, LoginRespMsg,
    PresenceChangedMsg, SendMsgReq, SendMsgResp, SendReceiptMsg, SetAwayMsg,
};
use biz_service::protocol::{decode_frame, encode_frame};
use bytes::Bytes;
use common::util::common_utils::build_uuid;
use common::util::date_util::now_millis;
use common::{AppError, AppResult};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use prost::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

type FrameReader = FramedRead<OwnedReadHalf, LengthDelimitedCodec>;

/// 客户端连接处理入口
pub async fn handle_connection(stream: TcpStream, service: Arc<ChatService>, sink: Arc<SocketSink>) -> Result<()> {
    let conn_id = ConnectionId::from(build_uuid());
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, LengthDelimitedCodec::new());
    let mut writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());

    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    sink.attach(&conn_id, tx);

    // 启动写任务
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = writer.send(msg).await {
                warn!("❌ 写入客户端失败: {:?}", e);
                break;
            }
        }
    });

    let result = match login(&mut reader, &conn_id, &service, &sink).await {
        Ok(uid) => {
            let result = read_loop(&mut reader, &conn_id, &uid, &service, &sink).await;
            // 心跳超时的连接已被清理
            if let Err(e) = service.on_disconnect(&conn_id) {
                debug!("连接已注销: {}", e);
            }
            result
        }
        Err(e) => Err(e),
    };

    // 关闭写通道，尽量把剩余帧写完
    sink.detach(&conn_id);
    if tokio::time::timeout(Duration::from_secs(1), &mut write_task).await.is_err() {
        write_task.abort();
    }
    result
}

/// 第一个帧必须是登录请求
async fn login(reader: &mut FrameReader, conn_id: &ConnectionId, service: &ChatService, sink: &SocketSink) -> Result<String> {
    let timeout = service.config().get_presence().heartbeat_timeout();
    let frame = match tokio::time::timeout(timeout, reader.next()).await {
        Ok(Some(frame)) => frame?,
        Ok(None) => return Err(anyhow!("连接在登录前关闭")),
        Err(_) => return Err(anyhow!("登录超时: {}", conn_id)),
    };
    let (msg_type, body) = decode_frame(frame.freeze())?;
    if msg_type != ByteMessageType::LoginReqMsgType {
        let err = AppError::Validation("login required".to_string());
        send_error(sink, conn_id, msg_type, &err);
        return Err(err.into());
    }

    let login = LoginReqMsg::decode(body)?;
    info!("🛂 收到登录请求: uid={} conn={}", login.uid, conn_id);
    let connected = async {
        if !login.display_name.is_empty() {
            service.users().provision(&login.uid, &login.display_name)?;
        }
        service.on_connect(&login.uid, conn_id, DeviceType::from(login.device_type)).await
    };
    match connected.await {
        Ok(flushed) => {
            let resp = LoginRespMsg { conn_id: conn_id.0.clone(), flushed: flushed as u32 };
            if let Err(e) = sink.send_proto(conn_id, ByteMessageType::LoginRespMsgType, &resp) {
                // 已注册但客户端收不到登录响应，撤销注册
                if let Err(unregister) = service.on_disconnect(conn_id) {
                    debug!("连接已注销: {}", unregister);
                }
                return Err(e.into());
            }
            Ok(login.uid)
        }
        Err(e) => {
            send_error(sink, conn_id, msg_type, &e);
            Err(e.into())
        }
    }
}

/// 读取客户端数据 & 处理消息
async fn read_loop(reader: &mut FrameReader, conn_id: &ConnectionId, uid: &str, service: &ChatService, sink: &SocketSink) -> Result<()> {
    let cancel = service.presence().connection(conn_id).map(|c| c.cancel_token()).unwrap_or_default();
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                info!("⏱️ 连接已被服务端注销: {}", conn_id);
                break;
            }
            frame = reader.next() => match frame {
                Some(frame) => frame?,
                None => break,
            },
        };
        let (msg_type, body) = match decode_frame(frame.freeze()) {
            Ok(decoded) => decoded,
            Err(e) => {
                send_error(sink, conn_id, ByteMessageType::UnknownByteMessageType, &e);
                continue;
            }
        };
        if let Err(e) = handle_frame(msg_type, body, conn_id, uid, service, sink).await {
            debug!("⚠️ 请求处理失败: conn={} type={:?} err={}", conn_id, msg_type, e);
            send_error(sink, conn_id, msg_type, &e);
        }
    }
    Ok(())
}

async fn handle_frame(msg_type: ByteMessageType, body: Bytes, conn_id: &ConnectionId, uid: &str, service: &ChatService, sink: &SocketSink) -> AppResult<()> {
    let command = decode_command(msg_type, body)?;
    let reply = service.on_client_message(conn_id, command.clone()).await?;
    let frame = encode_reply(uid, &command, &reply).map_err(|e| AppError::Internal(e.to_string()))?;
    if let Some(frame) = frame {
        sink.send_to_connection(conn_id, frame).map_err(|e| AppError::Internal(e.to_string()))?;
    }
    Ok(())
}

fn decode_error(e: prost::DecodeError) -> AppError {
    AppError::Validation(format!("malformed frame: {}", e))
}

/// 把已登录连接上的帧解析为客户端指令
pub fn decode_command(msg_type: ByteMessageType, body: Bytes) -> AppResult<ClientCommand> {
    let command = match msg_type {
        ByteMessageType::SendMsgReqType => {
            let req = SendMsgReq::decode(body).map_err(decode_error)?;
            let target = if !req.to_group.is_empty() {
                ChatTarget::Group(req.to_group)
            } else if !req.to_user.is_empty() {
                ChatTarget::User(req.to_user)
            } else {
                return Err(AppError::Validation("message target is empty".to_string()));
            };
            ClientCommand::SendMessage { target, payload: req.payload, client_token: req.client_token }
        }
        ByteMessageType::AckMsgType => ClientCommand::Ack { sequence: AckMsg::decode(body).map_err(decode_error)?.sequence },
        ByteMessageType::HeartbeatMsgType => ClientCommand::Heartbeat,
        ByteMessageType::SetAwayMsgType => ClientCommand::SetAway { away: SetAwayMsg::decode(body).map_err(decode_error)?.away },
        ByteMessageType::FriendOpReqType => {
            let req = FriendOpReq::decode(body).map_err(decode_error)?;
            let target = req.target;
            match FriendOp::try_from(req.op).unwrap_or(FriendOp::UnknownFriendOp) {
                FriendOp::Request => ClientCommand::FriendRequest { to: target },
                FriendOp::Accept => ClientCommand::FriendRespond { requester: target, accept: true },
                FriendOp::Reject => ClientCommand::FriendRespond { requester: target, accept: false },
                FriendOp::Remove => ClientCommand::FriendRemove { peer: target },
                FriendOp::Block => ClientCommand::Block { target },
                FriendOp::Unblock => ClientCommand::Unblock { target },
                FriendOp::UnknownFriendOp => return Err(AppError::Validation(format!("unknown friend op {}", req.op))),
            }
        }
        other => return Err(AppError::Validation(format!("unsupported frame type {:?}", other))),
    };
    Ok(command)
}

/// 指令结果编码为回复帧；确认类指令不回复
pub fn encode_reply(uid: &str, command: &ClientCommand, reply: &ClientReply) -> Result<Option<Bytes>, SendError> {
    let frame = match reply {
        ClientReply::Sent(receipts) => {
            let client_token = match command {
                ClientCommand::SendMessage { client_token, .. } => client_token.clone(),
                _ => String::new(),
            };
            let resp = SendMsgResp { client_token, receipts: receipts.iter().map(SendReceiptMsg::from).collect() };
            encode_frame(ByteMessageType::SendMsgRespType, &resp)?
        }
        ClientReply::Acked(_) => return Ok(None),
        ClientReply::HeartbeatOk => encode_frame(ByteMessageType::HeartbeatMsgType, &HeartbeatMsg { timestamp: now_millis() })?,
        ClientReply::Friend(edge) => {
            let (op, target) = friend_op(command);
            let resp = FriendOpResp { op: op as i32, target, status: edge.status.to_string(), changed: true };
            encode_frame(ByteMessageType::FriendOpRespType, &resp)?
        }
        ClientReply::Removed(changed) => {
            let (op, target) = friend_op(command);
            let status = if *changed { "removed".to_string() } else { String::new() };
            let resp = FriendOpResp { op: op as i32, target, status, changed: *changed };
            encode_frame(ByteMessageType::FriendOpRespType, &resp)?
        }
        ClientReply::Presence(status) => {
            let msg = PresenceChangedMsg { uid: uid.to_string(), status: status.to_string() };
            encode_frame(ByteMessageType::PresenceChangedMsgType, &msg)?
        }
    };
    Ok(Some(frame))
}

fn friend_op(command: &ClientCommand) -> (FriendOp, String) {
    match command {
        ClientCommand::FriendRequest { to } => (FriendOp::Request, to.clone()),
        ClientCommand::FriendRespond { requester, accept: true } => (FriendOp::Accept, requester.clone()),
        ClientCommand::FriendRespond { requester, accept: false } => (FriendOp::Reject, requester.clone()),
        ClientCommand::FriendRemove { peer } => (FriendOp::Remove, peer.clone()),
        ClientCommand::Block { target } => (FriendOp::Block, target.clone()),
        ClientCommand::Unblock { target } => (FriendOp::Unblock, target.clone()),
        _ => (FriendOp::UnknownFriendOp, String::new()),
    }
}

fn send_error(sink: &SocketSink, conn_id: &ConnectionId, request_type: ByteMessageType, err: &AppError) {
    let msg = ErrorRespMsg { code: err.code() as i32, message: err.client_message(), request_type: request_type as i32 };
    if let Err(e) = sink.send_proto(conn_id, ByteMessageType::ErrorRespMsgType, &msg) {
        warn!("❌ 错误响应发送失败: conn={} err={}", conn_id, e);
    }
}
