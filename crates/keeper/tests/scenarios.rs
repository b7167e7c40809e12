//! The end-to-end walk through registration, inline items and a streamed file

mod common;

use common::{KeeperClient, TestServer, MAX_CHUNK_SIZE, TOKEN_SECRET, TOKEN_TTL};
use futures::stream;
use keeper::TokenManager;
use proto::create_item_stream_request::Data as UploadData;
use proto::get_item_stream_response::Data as DownloadData;
use proto::keeper::envelope::v1::BinaryInfo;
use proto::{
    CreateItemRequest, CreateItemStreamRequest, DeleteItemRequest, GetItemRequest,
    GetItemStreamRequest, ItemInfo, ListItemsRequest, LoginRequest, RegisterRequest, Secret,
    UpdateItemRequest,
};
use std::time::{SystemTime, UNIX_EPOCH};
use tonic::Code;

const EMAIL: &str = "alice@example.com";
const PASSWORD: &str = "pw-correct-horse";

fn photo_bytes() -> Vec<u8> {
    (0..2085u32).map(|i| (i % 251) as u8).collect()
}

async fn download(client: &mut KeeperClient, name: &str) -> (Vec<u8>, Vec<Vec<u8>>) {
    let mut frames = client
        .get_item_stream(GetItemStreamRequest {
            name: name.to_string(),
        })
        .await
        .unwrap()
        .into_inner();

    let mut content = None;
    let mut chunks = Vec::new();
    while let Some(frame) = frames.message().await.unwrap() {
        match frame.data.unwrap() {
            DownloadData::Content(bytes) => {
                assert!(content.is_none(), "content frame sent twice");
                assert!(chunks.is_empty(), "content frame after chunks");
                content = Some(bytes);
            }
            DownloadData::ChunkData(bytes) => chunks.push(bytes),
        }
    }
    (content.unwrap(), chunks)
}

#[tokio::test]
async fn test_keeper_walkthrough() {
    let server = TestServer::start().await;

    // 1. register and log in
    let mut auth = server.auth_client().await;
    let user_id = auth
        .register(RegisterRequest {
            email: EMAIL.to_string(),
            password: PASSWORD.to_string(),
        })
        .await
        .unwrap()
        .into_inner()
        .user_id;
    assert!(user_id > 0);

    let token = auth
        .login(LoginRequest {
            email: EMAIL.to_string(),
            password: PASSWORD.to_string(),
        })
        .await
        .unwrap()
        .into_inner()
        .token;

    let claims = TokenManager::new(TOKEN_SECRET.as_bytes(), TOKEN_TTL)
        .verify_claims(&token)
        .unwrap();
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    assert_eq!(claims.uid, user_id);
    assert_eq!(claims.email, EMAIL);
    assert!(claims.exp.abs_diff(now + TOKEN_TTL.as_secs()) <= 1);

    let mut keeper = server.keeper_client(&token).await;

    // 2. create and read back
    let created = keeper
        .create_item(CreateItemRequest {
            name: "gmail".to_string(),
            content: vec![0x01, 0x02, 0x03],
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(created.name, "gmail");
    let v1 = created.version;

    let fetched = keeper
        .get_item(GetItemRequest {
            name: "gmail".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(fetched.content, vec![0x01, 0x02, 0x03]);
    assert_eq!(fetched.version, v1);

    // 3. update
    let v2 = keeper
        .update_item(UpdateItemRequest {
            name: "gmail".to_string(),
            content: vec![0x04],
        })
        .await
        .unwrap()
        .into_inner()
        .version;
    assert_ne!(v2, v1);

    let fetched = keeper
        .get_item(GetItemRequest {
            name: "gmail".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(fetched.content, vec![0x04]);
    assert_eq!(fetched.version, v2);

    // 4. duplicate create
    let err = keeper
        .create_item(CreateItemRequest {
            name: "gmail".to_string(),
            content: vec![0x05],
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::AlreadyExists);

    // 5. streamed upload and download
    let photo = photo_bytes();
    let info = Secret::Binary(BinaryInfo {
        file_name: "photo.jpg".to_string(),
        size: photo.len() as u64,
        note: String::new(),
    })
    .encode();

    let mut frames = vec![CreateItemStreamRequest {
        data: Some(UploadData::Info(ItemInfo {
            name: "photo".to_string(),
            content: info.clone(),
        })),
    }];
    for chunk in [&photo[..1024], &photo[1024..2048], &photo[2048..]] {
        frames.push(CreateItemStreamRequest {
            data: Some(UploadData::ChunkData(chunk.to_vec())),
        });
    }

    let uploaded = keeper
        .create_item_stream(stream::iter(frames))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(uploaded.name, "photo");
    assert_ne!(uploaded.version, v2);

    let (content, chunks) = download(&mut keeper, "photo").await;
    assert_eq!(content, info);
    assert!(chunks.iter().all(|c| c.len() <= MAX_CHUNK_SIZE));
    assert_eq!(chunks.concat(), photo);
    assert_eq!(server.object_files().len(), 1);

    let listed = keeper
        .list_items(ListItemsRequest {})
        .await
        .unwrap()
        .into_inner()
        .items;
    let names: Vec<_> = listed.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, vec!["gmail", "photo"]);

    // 6. delete
    let deleted = keeper
        .delete_item(DeleteItemRequest {
            name: "photo".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(deleted.name, "photo");

    let err = keeper
        .get_item(GetItemRequest {
            name: "photo".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert!(server.object_files().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let server = TestServer::start().await;
    let (_, token) = server.sign_up(EMAIL, PASSWORD).await;
    let mut keeper = server.keeper_client(&token).await;

    keeper
        .create_item(CreateItemRequest {
            name: "gmail".to_string(),
            content: vec![],
        })
        .await
        .unwrap();

    for _ in 0..2 {
        keeper
            .delete_item(DeleteItemRequest {
                name: "gmail".to_string(),
            })
            .await
            .unwrap();
    }

    keeper
        .delete_item(DeleteItemRequest {
            name: "never-existed".to_string(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_items_are_scoped_to_their_owner() {
    let server = TestServer::start().await;
    let (_, alice) = server.sign_up(EMAIL, PASSWORD).await;
    let (_, bob) = server.sign_up("bob@example.com", "bob-password-1").await;

    let mut alice = server.keeper_client(&alice).await;
    let mut bob = server.keeper_client(&bob).await;

    alice
        .create_item(CreateItemRequest {
            name: "gmail".to_string(),
            content: vec![1],
        })
        .await
        .unwrap();

    let err = bob
        .get_item(GetItemRequest {
            name: "gmail".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);

    // same name, separate item
    bob.create_item(CreateItemRequest {
        name: "gmail".to_string(),
        content: vec![2],
    })
    .await
    .unwrap();

    let listed = bob
        .list_items(ListItemsRequest {})
        .await
        .unwrap()
        .into_inner()
        .items;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].content, vec![2]);
}
