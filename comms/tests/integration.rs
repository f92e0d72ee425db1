use std::net::{SocketAddr, TcpListener};

use comms::{
    Collective, Deserialize, Serialize,
    msg::{Msg, Payload},
};
use tokio::io;

struct MyStr<'a>(&'a str);

impl<'a> Serialize<'a> for MyStr<'_> {
    fn serialize(&'a self, _buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        Some(self.0.as_bytes())
    }
}

impl<'a> Deserialize<'a> for MyStr<'a> {
    fn deserialize(buf: &'a mut [u8]) -> std::io::Result<Self> {
        Ok(Self(str::from_utf8(buf).unwrap()))
    }
}

#[tokio::test]
async fn send_recv() {
    const SIZE: usize = 128;

    let msg = MyStr("Hello, world!");

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    tx.send(&msg).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf: Vec<u64> = Vec::new();
    let s: MyStr = rx.recv_into(&mut buf).await.unwrap();

    assert_eq!(msg.0, s.0);
}

#[tokio::test]
async fn send_recv_values() {
    let values = [1.0, 2.5, -4.0];

    let (one, two) = io::duplex(256);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);
    tx.send(&Msg::Data(Payload::Broadcast(&values))).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);
    let mut buf: Vec<u64> = Vec::new();

    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Data(Payload::Broadcast(nums)) => assert_eq!(nums, values),
        other => panic!("unexpected msg: {other:?}"),
    }
}

async fn run_group<F, Fut, T>(world_size: usize, f: F) -> Vec<std::io::Result<T>>
where
    F: Fn(comms::LocalMember) -> Fut,
    Fut: Future<Output = std::io::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = comms::local_group(world_size)
        .unwrap()
        .into_iter()
        .map(|member| tokio::spawn(f(member)))
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn allreduce_sums_every_rank() {
    const WORLD: usize = 4;

    let results = run_group(WORLD, |mut member| async move {
        let rank = member.rank() as f64;
        member.allreduce(&[rank, 1.0]).await
    })
    .await;

    for result in results {
        assert_eq!(result.unwrap(), vec![6.0, 4.0]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broadcast_from_hub_and_from_leaf() {
    const WORLD: usize = 3;

    let results = run_group(WORLD, |mut member| async move {
        let own = [member.rank() as f64 + 10.0];
        let from_hub = member.broadcast(&own, 0).await?;
        let from_leaf = member.broadcast(&own, 2).await?;
        Ok::<_, std::io::Error>((from_hub, from_leaf))
    })
    .await;

    for result in results {
        let (from_hub, from_leaf) = result.unwrap();
        assert_eq!(from_hub, vec![10.0]);
        assert_eq!(from_leaf, vec![12.0]);
    }
}

#[tokio::test]
async fn broadcast_root_out_of_range_fails_locally() {
    let results = run_group(2, |mut member| async move { member.broadcast(&[1.0], 5).await }).await;
    assert!(results.iter().all(Result::is_err));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn allreduce_length_mismatch_fails_every_rank() {
    let results = run_group(3, |mut member| async move {
        let local = vec![1.0; member.rank() + 1];
        member.allreduce(&local).await
    })
    .await;

    for result in results {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn allreduce_abort_reaches_leaves_after_the_bad_one() {
    let results = run_group(4, |mut member| async move {
        let local = if member.rank() == 1 { vec![1.0; 3] } else { vec![1.0] };
        member.allreduce(&local).await
    })
    .await;

    for (rank, result) in results.into_iter().enumerate() {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData, "rank {rank}: {err}");
        if rank > 0 {
            assert!(err.to_string().contains("hub aborted allreduce"), "rank {rank}: {err}");
        }
    }
}

#[test]
fn empty_group_is_rejected() {
    assert!(comms::local_group(0).is_err());
}

fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn tcp_rendezvous_and_allreduce() {
    const WORLD: usize = 3;
    let addr = free_addr();

    let handles: Vec<_> = (0..WORLD)
        .map(|rank| {
            tokio::spawn(async move {
                let mut member = comms::rendezvous(addr, rank, WORLD).await?;
                let sum = member.allreduce(&[rank as f64]).await?;
                member.shutdown().await?;
                Ok::<_, std::io::Error>(sum)
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), vec![3.0]);
    }
}

#[tokio::test]
async fn rendezvous_rejects_rank_out_of_range() {
    let addr = free_addr();
    assert!(comms::rendezvous(addr, 3, 3).await.is_err());
}
