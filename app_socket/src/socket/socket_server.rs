use crate::socket::socket_connection::handle_connection;
use crate::socket::socket_sink::SocketSink;
use biz_service::biz_service::chat_service::ChatService;
use log::{error, info};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// 启动 TCP 服务，`shutdown` 取消后停止接收新连接
pub async fn start_server(listener: TcpListener, service: Arc<ChatService>, sink: Arc<SocketSink>, shutdown: CancellationToken) -> anyhow::Result<()> {
    info!("✅ TCP 服务器已启动，开始监听连接: {}", listener.local_addr()?);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("🛑 停止接收新连接");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("📡 新连接建立 [{}]", addr);
                    let service = service.clone();
                    let sink = sink.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, service, sink).await {
                            error!("❌ 连接处理失败 [{}]: {:?}", addr, e);
                        } else {
                            info!("🔌 连接处理完成 [{}]", addr);
                        }
                    });
                }
                Err(e) => {
                    error!("❌ TCP 连接接收失败: {:?}", e);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biz_service::protocol::msg::{ByteMessageType, ErrorRespMsg, LoginReqMsg, LoginRespMsg, MessageEnvelopeMsg, SendMsgReq, SendMsgResp};
    use biz_service::protocol::{decode_frame, encode_frame};
    use bytes::Bytes;
    use common::config::AppConfig;
    use futures::{SinkExt, StreamExt};
    use prost::Message;
    use tokio::net::TcpStream;
    use tokio_util::codec::{Framed, LengthDelimitedCodec};

    type Client = Framed<TcpStream, LengthDelimitedCodec>;

    async fn connect(addr: std::net::SocketAddr) -> Client {
        Framed::new(TcpStream::connect(addr).await.unwrap(), LengthDelimitedCodec::new())
    }

    async fn send<M: Message>(client: &mut Client, msg_type: ByteMessageType, msg: &M) {
        client.send(encode_frame(msg_type, msg).unwrap()).await.unwrap();
    }

    async fn recv(client: &mut Client) -> (ByteMessageType, Bytes) {
        decode_frame(client.next().await.unwrap().unwrap().freeze()).unwrap()
    }

    async fn login(client: &mut Client, uid: &str) -> LoginRespMsg {
        send(client, ByteMessageType::LoginReqMsgType, &LoginReqMsg { uid: uid.to_string(), device_type: 1, display_name: String::new() }).await;
        let (msg_type, body) = recv(client).await;
        assert_eq!(msg_type, ByteMessageType::LoginRespMsgType);
        LoginRespMsg::decode(body).unwrap()
    }

    #[tokio::test]
    async fn test_message_round_trip_over_tcp() {
        let sink = Arc::new(SocketSink::new());
        let service = ChatService::new(Arc::new(AppConfig::default()), sink.clone());
        service.graph().request_friend("alice", "bob").unwrap();
        service.graph().respond_friend("bob", "alice", true).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(start_server(listener, service.clone(), sink, shutdown.clone()));

        let mut alice = connect(addr).await;
        login(&mut alice, "alice").await;
        let mut bob = connect(addr).await;
        assert_eq!(login(&mut bob, "bob").await.flushed, 0);

        let req = SendMsgReq {
            to_user: "bob".to_string(),
            to_group: String::new(),
            payload: Bytes::from_static(b"ping"),
            client_token: "c1".to_string(),
        };
        send(&mut alice, ByteMessageType::SendMsgReqType, &req).await;

        let (msg_type, body) = recv(&mut bob).await;
        assert_eq!(msg_type, ByteMessageType::MessageEnvelopeMsgType);
        let envelope = MessageEnvelopeMsg::decode(body).unwrap();
        assert_eq!(envelope.sender_id, "alice");
        assert_eq!(envelope.sequence, 1);
        assert_eq!(envelope.payload, Bytes::from_static(b"ping"));

        let (msg_type, body) = recv(&mut alice).await;
        assert_eq!(msg_type, ByteMessageType::SendMsgRespType);
        assert_eq!(SendMsgResp::decode(body).unwrap().receipts[0].status, "delivered");

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_first_frame_must_be_login() {
        let sink = Arc::new(SocketSink::new());
        let service = ChatService::new(Arc::new(AppConfig::default()), sink.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(start_server(listener, service.clone(), sink, shutdown.clone()));

        let mut client = connect(addr).await;
        let req = SendMsgReq { to_user: "bob".to_string(), ..Default::default() };
        send(&mut client, ByteMessageType::SendMsgReqType, &req).await;

        let (msg_type, body) = recv(&mut client).await;
        assert_eq!(msg_type, ByteMessageType::ErrorRespMsgType);
        assert_eq!(ErrorRespMsg::decode(body).unwrap().code, 400);
        assert!(client.next().await.is_none());
        assert_eq!(service.presence().connection_count(), 0);
        shutdown.cancel();
    }
}
