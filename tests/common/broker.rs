//! A scripted in-process MQTT 3.1.1 broker for echo and monitor tests.
//!
//! It plays both the broker and the hub: publishes from the harness are
//! answered on the reply topic according to the `Reply` script.

use bytes::BytesMut;
use hub_test_harness::config::BrokerConfig;
use parking_lot::Mutex;
use rumqttc::mqttbytes::v4::{
    read, ConnAck, ConnectReturnCode, Packet, PingResp, PubAck, Publish, SubAck,
    SubscribeReasonCode, UnsubAck,
};
use rumqttc::QoS;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// How the simulated hub answers a published token.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Echo the payload back unchanged.
    Echo,
    /// Echo only from the n-th publish on, like a hub that subscribes late.
    EchoFrom(usize),
    /// Answer with a fixed payload.
    Fixed(&'static str),
    Silent,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub reply_topic: String,
    pub reply: Reply,
    /// Sent right after every SUBACK, e.g. retained messages.
    pub on_subscribe: Vec<Publish>,
}

impl Script {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply_topic: "/test/subscribe".to_string(),
            reply,
            on_subscribe: Vec::new(),
        }
    }

    pub fn with_retained(mut self, topic: &str, payload: &str) -> Self {
        let mut publish = Publish::new(topic, QoS::AtMostOnce, payload);
        publish.retain = true;
        self.on_subscribe.push(publish);
        self
    }

    pub fn with_message(mut self, topic: &str, payload: &str) -> Self {
        self.on_subscribe
            .push(Publish::new(topic, QoS::AtMostOnce, payload));
        self
    }
}

/// What the broker saw from the harness.
#[derive(Debug, Default, Clone)]
pub struct BrokerLog {
    pub subscribes: Vec<String>,
    pub unsubscribes: Vec<String>,
    pub publishes: Vec<(String, Vec<u8>)>,
}

pub struct FakeBroker {
    pub port: u16,
    log: Arc<Mutex<BrokerLog>>,
}

impl FakeBroker {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind broker");
        let port = listener.local_addr().expect("broker addr").port();
        let log = Arc::new(Mutex::new(BrokerLog::default()));

        let shared = log.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, script.clone(), shared.clone()));
            }
        });

        Self { port, log }
    }

    pub fn config(&self) -> BrokerConfig {
        BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: self.port,
            ..Default::default()
        }
    }

    pub fn log(&self) -> BrokerLog {
        self.log.lock().clone()
    }

    /// Poll the log until `check` holds or `timeout` passes.
    pub async fn wait_for(&self, timeout: Duration, check: impl Fn(&BrokerLog) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if check(&*self.log.lock()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check(&*self.log.lock())
    }
}

async fn serve(mut socket: TcpStream, script: Script, log: Arc<Mutex<BrokerLog>>) {
    let mut buf = BytesMut::new();
    let mut published = 0usize;

    loop {
        let packet = match read(&mut buf, 1 << 20) {
            Ok(packet) => packet,
            Err(_) => {
                // Incomplete packet; read more.
                let mut chunk = [0u8; 1024];
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
                continue;
            }
        };

        let mut out = BytesMut::new();
        let written = match packet {
            Packet::Connect(_) => ConnAck::new(ConnectReturnCode::Success, false).write(&mut out),
            Packet::Subscribe(subscribe) => {
                log.lock()
                    .subscribes
                    .extend(subscribe.filters.iter().map(|f| f.path.clone()));
                let codes = subscribe
                    .filters
                    .iter()
                    .map(|_| SubscribeReasonCode::Success(QoS::AtLeastOnce))
                    .collect();
                let mut result = SubAck::new(subscribe.pkid, codes).write(&mut out);
                for publish in &script.on_subscribe {
                    result = result.and_then(|_| publish.write(&mut out));
                }
                result
            }
            Packet::Publish(publish) => {
                published += 1;
                log.lock()
                    .publishes
                    .push((publish.topic.clone(), publish.payload.to_vec()));

                let mut result = Ok(0);
                if publish.qos != QoS::AtMostOnce {
                    result = PubAck::new(publish.pkid).write(&mut out);
                }
                let answer = match &script.reply {
                    Reply::Echo => Some(publish.payload.to_vec()),
                    Reply::EchoFrom(n) if published >= *n => Some(publish.payload.to_vec()),
                    Reply::EchoFrom(_) | Reply::Silent => None,
                    Reply::Fixed(payload) => Some(payload.as_bytes().to_vec()),
                };
                if let Some(answer) = answer {
                    let reply = Publish::new(script.reply_topic.clone(), QoS::AtMostOnce, answer);
                    result = result.and_then(|_| reply.write(&mut out));
                }
                result
            }
            Packet::Unsubscribe(unsubscribe) => {
                log.lock().unsubscribes.extend(unsubscribe.topics.clone());
                UnsubAck::new(unsubscribe.pkid).write(&mut out)
            }
            Packet::PingReq => PingResp.write(&mut out),
            Packet::Disconnect => return,
            _ => Ok(0),
        };

        if written.is_err() || socket.write_all(&out).await.is_err() {
            return;
        }
    }
}
