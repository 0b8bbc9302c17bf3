//! Generate test vectors for dispatcher interop testing.
//!
//! Run with: cargo run --package protocol --example test_vectors

use protocol::messages::*;

fn main() {
    // Test vector 1: auth
    let auth = Envelope::new(
        1,
        Message::Request(Command::Auth {
            username: "guest".to_string(),
            password: "guest".to_string(),
        }),
    );
    print_test_vector("auth", &auth);

    // Test vector 2: list
    let list = Envelope::new(
        2,
        Message::Request(Command::List {
            path: "smb://nas/public/".to_string(),
        }),
    );
    print_test_vector("list_request", &list);

    // Test vector 3: listing response
    let listing = Envelope::new(
        2,
        Message::Response(Response::Entries(Some(vec![
            FileEntry {
                name: "photos".to_string(),
                entry_type: EntryType::Directory,
                path: "smb://nas/public/photos/".to_string(),
                size: 0,
                last_modified: 1_704_067_200_000,
            },
            FileEntry {
                name: "readme.txt".to_string(),
                entry_type: EntryType::File,
                path: "smb://nas/public/readme.txt".to_string(),
                size: 100,
                last_modified: 1_704_067_200_000,
            },
        ]))),
    );
    print_test_vector("list_response", &listing);

    // Test vector 4: progress
    let progress = Envelope::new(3, Message::Progress(Progress { fraction: 0.5 }));
    print_test_vector("progress", &progress);

    // Test vector 5: error
    let error = Envelope::new(
        4,
        Message::Error(ErrorMessage {
            code: ErrorCode::NotFound,
            message: "not found: smb://nas/public/missing".to_string(),
            context: Some("delete".to_string()),
            recoverable: false,
        }),
    );
    print_test_vector("error", &error);
}

fn print_test_vector(name: &str, envelope: &Envelope) {
    let bytes = envelope.to_msgpack().expect("serialization failed");
    print!("export const {} = new Uint8Array([", name);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            print!(", ");
        }
        print!("{}", b);
    }
    println!("]);");
    let json = envelope.to_json().expect("serialization failed");
    println!("export const {}_json = {};", name, json);
}
