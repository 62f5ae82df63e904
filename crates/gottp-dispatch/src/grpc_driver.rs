// SPDX-License-Identifier: MIT OR Apache-2.0
//! The gRPC driver: server reflection discovery plus dynamic-descriptor
//! unary and streaming calls, built on `tonic` + `prost-reflect`.

use gottp_error::Error;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor, MethodDescriptor};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::{Channel, Endpoint};
use tonic_reflection::pb::v1alpha::server_reflection_client::ServerReflectionClient;
use tonic_reflection::pb::v1alpha::server_reflection_request::MessageRequest;
use tonic_reflection::pb::v1alpha::server_reflection_response::MessageResponse;
use tonic_reflection::pb::v1alpha::{FileDescriptorResponse, ServerReflectionRequest};

/// One method discovered via reflection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSummary {
    /// Unqualified method name.
    pub method_name: String,
    /// Fully-qualified `package.Service.Method`.
    pub full_name: String,
    /// Input message type name.
    pub input_type: String,
    /// Output message type name.
    pub output_type: String,
    /// `true` if the client streams requests.
    pub is_client_stream: bool,
    /// `true` if the server streams responses.
    pub is_server_stream: bool,
}

/// One service discovered via reflection, with its methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSummary {
    /// Fully-qualified service name.
    pub service_name: String,
    /// Methods exposed by this service.
    pub methods: Vec<MethodSummary>,
}

/// Decide whether to dial with TLS: explicit `grpcs://` scheme, or a
/// standard TLS port (443) on a bare `grpc://`/host:port target.
pub fn should_use_tls(target: &str) -> bool {
    if let Some(rest) = target.strip_prefix("grpcs://") {
        let _ = rest;
        return true;
    }
    if target.starts_with("grpc://") {
        return target.ends_with(":443");
    }
    target.ends_with(":443")
}

fn strip_scheme(target: &str) -> String {
    target.strip_prefix("grpcs://").or_else(|| target.strip_prefix("grpc://")).unwrap_or(target).to_string()
}

/// Dial a gRPC endpoint, selecting TLS per [`should_use_tls`].
pub async fn dial(target: &str) -> Result<Channel, Error> {
    let tls = should_use_tls(target);
    let host = strip_scheme(target);
    let uri = format!("{}://{host}", if tls { "https" } else { "http" });

    let mut endpoint = Endpoint::from_shared(uri).map_err(|e| Error::validation("invalid gRPC target").with_source(Box::new(e)))?;
    if tls {
        endpoint = endpoint
            .tls_config(tonic::transport::ClientTlsConfig::new().with_native_roots())
            .map_err(|e| Error::internal("failed to configure gRPC TLS").with_source(Box::new(e)))?;
    }
    endpoint
        .connect()
        .await
        .map_err(|e| Error::network("gRPC dial failed").with_source(Box::new(e)))
}

/// Query `grpc.reflection.v1alpha.ServerReflection` for every service and
/// method the target exposes (§4.4's gRPC driver).
pub async fn reflect(channel: Channel) -> Result<(Vec<ServiceSummary>, DescriptorPool), Error> {
    let mut client = ServerReflectionClient::new(channel);

    let list_request = ServerReflectionRequest {
        host: String::new(),
        message_request: Some(MessageRequest::ListServices(String::new())),
    };
    let mut stream = client
        .server_reflection_info(tokio_stream::once(list_request))
        .await
        .map_err(|e| Error::network("gRPC reflection call failed").with_source(Box::new(e)))?
        .into_inner();

    let response = stream
        .message()
        .await
        .map_err(|e| Error::protocol("malformed reflection response").with_source(Box::new(e)))?
        .ok_or_else(|| Error::protocol("empty reflection response"))?;

    let service_names: Vec<String> = match response.message_response {
        Some(MessageResponse::ListServicesResponse(list)) => list.service.into_iter().map(|s| s.name).collect(),
        _ => return Err(Error::protocol("reflection server did not return a service list")),
    };

    let mut pool = DescriptorPool::global();
    let mut summaries = Vec::with_capacity(service_names.len());

    for service_name in &service_names {
        if service_name.starts_with("grpc.reflection") {
            continue;
        }
        let file_request = ServerReflectionRequest {
            host: String::new(),
            message_request: Some(MessageRequest::FileContainingSymbol(service_name.clone())),
        };
        let mut file_stream = client
            .server_reflection_info(tokio_stream::once(file_request))
            .await
            .map_err(|e| Error::network("gRPC reflection file lookup failed").with_source(Box::new(e)))?
            .into_inner();

        if let Some(resp) = file_stream.message().await.map_err(|e| Error::protocol("malformed reflection file response").with_source(Box::new(e)))? {
            if let Some(MessageResponse::FileDescriptorResponse(FileDescriptorResponse { file_descriptor_proto })) = resp.message_response {
                for raw in file_descriptor_proto {
                    if let Ok(fd) = prost_types::FileDescriptorProto::decode(raw.as_slice()) {
                        let _ = pool.add_file_descriptor_proto(fd);
                    }
                }
            }
        }

        if let Some(service) = pool.get_service_by_name(service_name) {
            let methods = service
                .methods()
                .map(|m| MethodSummary {
                    method_name: m.name().to_string(),
                    full_name: format!("{service_name}.{}", m.name()),
                    input_type: m.input().full_name().to_string(),
                    output_type: m.output().full_name().to_string(),
                    is_client_stream: m.is_client_streaming(),
                    is_server_stream: m.is_server_streaming(),
                })
                .collect();
            summaries.push(ServiceSummary { service_name: service_name.clone(), methods });
        }
    }

    Ok((summaries, pool))
}

use prost::Message as _;

/// Look up a method's descriptor within a previously reflected pool.
pub fn find_method(pool: &DescriptorPool, service_name: &str, method_name: &str) -> Option<MethodDescriptor> {
    pool.get_service_by_name(service_name)?.methods().find(|m| m.name() == method_name)
}

fn method_path(method: &MethodDescriptor) -> String {
    format!("/{}/{}", method.parent_service().full_name(), method.name())
}

fn decode_to_json(message: DynamicMessage) -> Result<Value, Error> {
    message
        .transcode_to_dynamic()
        .serialize(serde_json::value::Serializer)
        .map_err(|e| Error::protocol("failed to encode gRPC response frame as JSON").with_source(Box::new(e)))
}

async fn dial_grpc(channel: Channel) -> Result<tonic::client::Grpc<Channel>, Error> {
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready().await.map_err(|e| Error::network("gRPC transport not ready").with_source(Box::new(e)))?;
    Ok(grpc)
}

/// Execute a unary call: encode `request_json` into the method's discovered
/// input type, send it, and decode the response back to JSON (§4.4).
pub async fn call_unary(channel: Channel, method: &MethodDescriptor, request_json: &Value) -> Result<Value, Error> {
    let input = DynamicMessage::deserialize(method.input(), request_json.clone())
        .map_err(|e| Error::validation("request JSON does not match the discovered input message type").with_source(Box::new(e)))?;

    let path = method_path(method);
    let codec = DynamicCodec::new(method.clone());
    let mut grpc = dial_grpc(channel).await?;

    let request = tonic::Request::new(input);
    let response = grpc
        .unary(request, path.parse().map_err(|_| Error::internal("invalid gRPC method path"))?, codec)
        .await
        .map_err(|status| Error::protocol(format!("gRPC call failed: {status}")))?;

    decode_to_json(response.into_inner())
}

/// Outbound FIFO capacity for client/bidi streaming request input, matching
/// the WebSocket writer's backpressure capacity (§4.4).
pub const STREAM_CHANNEL_CAPACITY: usize = 64;

/// One event surfaced to the caller of a server- or bidi-streaming call,
/// analogous to the WebSocket driver's `ConnectionEvent` (§4.4).
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A response frame, transcoded to JSON, as it arrives.
    Frame(Value),
    /// The response stream ended cleanly.
    Ended,
    /// The response stream ended because of an error.
    Failed(String),
}

/// Accepts outbound request frames for a client- or bidi-streaming call,
/// validating each against the method's discovered input type before
/// queuing it (the bounded channel mirrors the WebSocket writer's FIFO).
pub struct RequestSender {
    tx: mpsc::Sender<DynamicMessage>,
    input: MessageDescriptor,
}

impl RequestSender {
    /// Queue one outbound frame, failing if it does not match the method's
    /// discovered input message type.
    pub async fn send(&self, value: &Value) -> Result<(), Error> {
        let message = DynamicMessage::deserialize(self.input.clone(), value.clone())
            .map_err(|e| Error::validation("stream frame does not match the discovered input message type").with_source(Box::new(e)))?;
        self.tx.send(message).await.map_err(|_| Error::network("gRPC request stream is closed"))
    }
}

async fn forward_response_stream(mut stream: tonic::Streaming<DynamicMessage>, inbound: mpsc::Sender<StreamEvent>) {
    loop {
        match stream.message().await {
            Ok(Some(message)) => {
                let event = match decode_to_json(message) {
                    Ok(value) => StreamEvent::Frame(value),
                    Err(e) => StreamEvent::Failed(e.to_string()),
                };
                if inbound.send(event).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                let _ = inbound.send(StreamEvent::Ended).await;
                return;
            }
            Err(status) => {
                let _ = inbound.send(StreamEvent::Failed(status.to_string())).await;
                return;
            }
        }
    }
}

/// A handle to a live server- or bidi-streaming call: response frames arrive
/// as [`StreamEvent`]s; bidi calls also accept outbound frames via
/// [`StreamHandle::send`] (§4.4).
pub struct StreamHandle {
    sender: Option<RequestSender>,
    inbound: mpsc::Receiver<StreamEvent>,
    task: tokio::task::JoinHandle<()>,
}

impl StreamHandle {
    /// Queue an outbound frame. Only valid on a bidi stream; a
    /// server-streaming call has no request channel.
    pub async fn send(&self, value: &Value) -> Result<(), Error> {
        match &self.sender {
            Some(sender) => sender.send(value).await,
            None => Err(Error::validation("this stream is server-streaming only; it has no request channel")),
        }
    }

    /// Receive the next frame, end, or error event.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.inbound.recv().await
    }

    /// Close the request side (bidi only, a no-op on server-streaming
    /// handles) and wait for the response-forwarding task to finish.
    pub async fn close(mut self) {
        self.sender.take();
        let _ = self.task.await;
    }
}

/// Execute a server-streaming call: one request frame, a stream of response
/// frames emitted to the caller as each one arrives (§4.4).
pub async fn call_server_streaming(channel: Channel, method: &MethodDescriptor, request_json: &Value) -> Result<StreamHandle, Error> {
    let input = DynamicMessage::deserialize(method.input(), request_json.clone())
        .map_err(|e| Error::validation("request JSON does not match the discovered input message type").with_source(Box::new(e)))?;

    let path = method_path(method);
    let codec = DynamicCodec::new(method.clone());
    let mut grpc = dial_grpc(channel).await?;

    let response = grpc
        .server_streaming(tonic::Request::new(input), path.parse().map_err(|_| Error::internal("invalid gRPC method path"))?, codec)
        .await
        .map_err(|status| Error::protocol(format!("gRPC call failed: {status}")))?;

    let (inbound_tx, inbound_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let task = tokio::spawn(forward_response_stream(response.into_inner(), inbound_tx));

    Ok(StreamHandle { sender: None, inbound: inbound_rx, task })
}

/// A handle to a live client-streaming call: the caller feeds request frames
/// through [`ClientStreamHandle::send`]; the single response is available
/// once the request stream is closed via [`ClientStreamHandle::finish`]
/// (§4.4).
pub struct ClientStreamHandle {
    sender: RequestSender,
    task: tokio::task::JoinHandle<Result<Value, Error>>,
}

impl ClientStreamHandle {
    /// Queue one outbound frame.
    pub async fn send(&self, value: &Value) -> Result<(), Error> {
        self.sender.send(value).await
    }

    /// Close the request stream and await the single response.
    pub async fn finish(self) -> Result<Value, Error> {
        drop(self.sender);
        self.task.await.map_err(|_| Error::internal("client-streaming task panicked"))?
    }
}

/// Execute a client-streaming call: request frames are fed in one at a time
/// through the returned handle, and the single response arrives once the
/// request side is closed (§4.4).
pub async fn call_client_streaming(channel: Channel, method: &MethodDescriptor) -> Result<ClientStreamHandle, Error> {
    let (tx, rx) = mpsc::channel::<DynamicMessage>(STREAM_CHANNEL_CAPACITY);
    let sender = RequestSender { tx, input: method.input() };

    let path_str = method_path(method);
    let codec = DynamicCodec::new(method.clone());
    let mut grpc = dial_grpc(channel).await?;

    let request_stream = ReceiverStream::new(rx);
    let task = tokio::spawn(async move {
        let path = path_str.parse().map_err(|_| Error::internal("invalid gRPC method path"))?;
        let response = grpc
            .client_streaming(tonic::Request::new(request_stream), path, codec)
            .await
            .map_err(|status| Error::protocol(format!("gRPC call failed: {status}")))?;
        decode_to_json(response.into_inner())
    });

    Ok(ClientStreamHandle { sender, task })
}

/// Execute a bidirectional-streaming call: the caller sends and receives
/// frames concurrently through the returned [`StreamHandle`] (§4.4).
pub async fn call_bidi_streaming(channel: Channel, method: &MethodDescriptor) -> Result<StreamHandle, Error> {
    let (tx, rx) = mpsc::channel::<DynamicMessage>(STREAM_CHANNEL_CAPACITY);
    let sender = RequestSender { tx, input: method.input() };

    let path = method_path(method);
    let codec = DynamicCodec::new(method.clone());
    let mut grpc = dial_grpc(channel).await?;

    let request_stream = ReceiverStream::new(rx);
    let response = grpc
        .streaming(tonic::Request::new(request_stream), path.parse().map_err(|_| Error::internal("invalid gRPC method path"))?, codec)
        .await
        .map_err(|status| Error::protocol(format!("gRPC call failed: {status}")))?;

    let (inbound_tx, inbound_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let task = tokio::spawn(forward_response_stream(response.into_inner(), inbound_tx));

    Ok(StreamHandle { sender: Some(sender), inbound: inbound_rx, task })
}

/// A `tonic` codec that marshals through [`DynamicMessage`] rather than a
/// generated `prost::Message` type, so requests/responses for
/// reflection-discovered methods can be built at runtime.
#[derive(Clone)]
struct DynamicCodec {
    method: MethodDescriptor,
}

impl DynamicCodec {
    fn new(method: MethodDescriptor) -> Self {
        Self { method }
    }
}

impl tonic::codec::Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;
    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder { output_type: self.method.output() }
    }
}

struct DynamicEncoder;

impl tonic::codec::Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = tonic::Status;

    fn encode(&mut self, item: Self::Item, dst: &mut tonic::codec::EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode(dst).map_err(|e| tonic::Status::internal(format!("gRPC encode failed: {e}")))
    }
}

struct DynamicDecoder {
    output_type: prost_reflect::MessageDescriptor,
}

impl tonic::codec::Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = tonic::Status;

    fn decode(&mut self, src: &mut tonic::codec::DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        DynamicMessage::decode(self.output_type.clone(), src)
            .map(Some)
            .map_err(|e| tonic::Status::internal(format!("gRPC decode failed: {e}")))
    }
}
