use std::{io, net::SocketAddr, time::Duration};

use futures::{future, stream::FuturesUnordered, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use super::{wrap_channel_with_bincode, BincodeStreamSink, MultipartyTransport};
use crate::config::PartyConfig;

/// Delay in milliseconds after which connection to peer is retried.
const CONNECTION_RETRY_DELAY: u64 = 1000;

/// Exchanged by both ends of a fresh connection before any message.
const HANDSHAKE_MAGIC: u32 = 0xDEADBEEF;

/// Bincode-encoded network channel.
pub type NetChannel<T> = BincodeStreamSink<T, TcpStream>;

/// Establish network connections for multiparty protocol.
/// Party `i` accepts connections from parties below `i` and connects to the ones above.
pub async fn connect_multiparty<T>(
    parties: &[PartyConfig],
    party_id: usize,
) -> Result<MultipartyTransport<T, NetChannel<T>>, io::Error>
where
    T: Serialize + DeserializeOwned,
{
    let this_party = parties
        .get(party_id)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Party ID out of range"))?;
    let listen_for = listen_for_parties(this_party.address, party_id);

    let connect_to = future::try_join_all(
        parties[party_id + 1..]
            .iter()
            .map(|config| connect_to_party(config, party_id)),
    );

    let (listen_for, connect_to) = futures::try_join!(listen_for, connect_to)?;
    tracing::debug!(party_id, "Connected to {} peers", parties.len() - 1);

    let channels = listen_for
        .into_iter()
        .map(Some)
        .chain(std::iter::once(None))
        .chain(connect_to.into_iter().map(Some))
        .map(|x| x.map(wrap_channel_with_bincode));

    Ok(MultipartyTransport::new(channels, party_id))
}

/// Listen for incoming connections from parties with lower IDs.
async fn listen_for_parties(
    addr: SocketAddr,
    num_lower: usize,
) -> Result<Vec<TcpStream>, io::Error> {
    if num_lower == 0 {
        return Ok(Vec::new());
    }

    let listener = TcpListener::bind(addr).await?;
    let mut futures = FuturesUnordered::new();
    let mut connected_parties: Vec<Option<TcpStream>> = (0..num_lower).map(|_| None).collect();

    loop {
        tokio::select! {
            tmp = listener.accept() => {
                let (socket, peer_addr) = tmp?;
                tracing::trace!(%peer_addr, "Incoming connection");
                futures.push(accept_party(num_lower, socket));
            },
            tmp = futures.next(), if !futures.is_empty() => {
                match tmp {
                    Some(Ok((socket, id))) if connected_parties[id].is_none() => {
                        connected_parties[id] = Some(socket);
                        if connected_parties.iter().all(Option::is_some) {
                            break;
                        }
                    }
                    Some(Err(err)) => tracing::warn!(%err, "Rejected incoming connection"),
                    _ => {}
                }
            },
        }
    }

    Ok(connected_parties.into_iter().flatten().collect())
}

/// Process incoming connection from party.
async fn accept_party(
    num_lower: usize,
    mut socket: TcpStream,
) -> Result<(TcpStream, usize), io::Error> {
    if socket.read_u32().await? != HANDSHAKE_MAGIC {
        return Err(io::Error::new(io::ErrorKind::Other, "Invalid magic"));
    }

    let party_id = socket.read_u32().await? as usize;
    if party_id >= num_lower {
        return Err(io::Error::new(io::ErrorKind::Other, "Invalid party ID"));
    }

    socket.write_u32(HANDSHAKE_MAGIC).await?;
    socket.flush().await?;

    Ok((socket, party_id))
}

/// Connect to party with higher ID.
async fn connect_to_party(
    other_party: &PartyConfig,
    this_party_id: usize,
) -> Result<TcpStream, io::Error> {
    let mut socket = loop {
        match TcpStream::connect(other_party.address).await {
            Ok(socket) => break socket,
            Err(err) => {
                tracing::trace!(address = %other_party.address, %err, "Retrying connection");
                tokio::time::sleep(Duration::from_millis(CONNECTION_RETRY_DELAY)).await
            }
        }
    };

    socket.write_u32(HANDSHAKE_MAGIC).await?;
    socket.write_u32(this_party_id as u32).await?;
    socket.flush().await?;

    if socket.read_u32().await? != HANDSHAKE_MAGIC {
        return Err(io::Error::new(io::ErrorKind::Other, "Invalid magic"));
    }

    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{transport::Transport, MpcContext};

    #[tokio::test]
    async fn test_connect_localhost() {
        let parties: Vec<_> = (0..3)
            .map(|i| PartyConfig {
                address: format!("127.0.0.1:{}", 38517 + i).parse().unwrap(),
            })
            .collect();

        let results = future::join_all((0..3).map(|id| {
            let parties = parties.clone();
            async move {
                let mut transport = connect_multiparty::<u32>(&parties, id).await.unwrap();
                assert_eq!(transport.num_parties(), 3);
                transport.exchange_with_all(id as u32).await.unwrap()
            }
        }))
        .await;

        assert_eq!(results[0], vec![(1, 1), (2, 2)]);
        assert_eq!(results[2], vec![(0, 0), (1, 1)]);
    }
}
