use shared::{
    ChatMessage, CodecRegistry, KeepAliveMessage, KickMessage, LoginMessage, Packet,
    PositionLookMessage, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

async fn send(
    socket: &UdpSocket,
    codecs: &CodecRegistry,
    packet: Packet,
    server_addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Sending {:?}", packet);
    let data = codecs.encode(&packet)?;
    socket.send_to(&data, server_addr).await?;
    Ok(())
}

/// Prints everything the server sends until it goes quiet
async fn drain(socket: &UdpSocket, codecs: &CodecRegistry, buf: &mut [u8]) {
    while let Ok(Ok((len, _))) = timeout(Duration::from_millis(300), socket.recv_from(buf)).await {
        match codecs.decode_frame(&buf[..len]) {
            Ok(packet) => println!("  <- {:?}", packet),
            Err(e) => println!("  <- undecodable frame ({} bytes): {}", len, e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let codecs = CodecRegistry::standard()?;

    // Create local socket
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    // Server address and player name from the command line
    let mut args = std::env::args().skip(1);
    let server_addr = args
        .next()
        .unwrap_or_else(|| "127.0.0.1:25565".to_string())
        .parse::<SocketAddr>()?;
    let name = args.next().unwrap_or_else(|| "tester".to_string());

    let login = Packet::Login(LoginMessage {
        protocol_version: PROTOCOL_VERSION,
        name,
    });
    send(&socket, &codecs, login, server_addr).await?;

    // Buffer for receiving data
    let mut buf = vec![0u8; 65536];

    println!("Waiting for server response...");
    let (len, addr) = socket.recv_from(&mut buf).await?;
    println!("Received {} bytes from {}", len, addr);

    match codecs.decode_frame(&buf[..len]) {
        Ok(Packet::LoginAccepted(accepted)) => {
            println!("Login accepted as entity {}", accepted.entity_id);

            send(&socket, &codecs, Packet::Chat(ChatMessage::new("hello")), server_addr).await?;
            drain(&socket, &codecs, &mut buf).await;

            send(&socket, &codecs, Packet::Chat(ChatMessage::new("/list")), server_addr).await?;
            drain(&socket, &codecs, &mut buf).await;

            // Walk in a small circle, keeping the connection alive
            for i in 0..10u32 {
                let angle = f64::from(i) / 5.0;
                let position = Packet::PositionLook(PositionLookMessage {
                    x: angle.cos() * 4.0,
                    y: 64.0,
                    z: angle.sin() * 4.0,
                    yaw: (angle.to_degrees() as f32) % 360.0,
                    pitch: 0.0,
                });
                send(&socket, &codecs, position, server_addr).await?;
                send(&socket, &codecs, Packet::KeepAlive(KeepAliveMessage { token: i }), server_addr)
                    .await?;
                drain(&socket, &codecs, &mut buf).await;

                sleep(Duration::from_millis(500)).await;
            }

            send(
                &socket,
                &codecs,
                Packet::Kick(KickMessage::new("Client test complete")),
                server_addr,
            )
            .await?;

            println!("Test client finished");
        }
        Ok(other) => println!("Expected LoginAccepted but got: {:?}", other),
        Err(e) => println!("Failed to decode response: {}", e),
    }

    Ok(())
}
