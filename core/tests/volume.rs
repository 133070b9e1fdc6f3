// Copyright 2024 Vdisk Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! End-to-end scenarios exercising `Volume` purely through its public API.

use tempfile::tempdir;
use vdisk::{Geometry, Volume};

fn scenario_geometry() -> Geometry {
    let _ = env_logger::builder().is_test(true).try_init();
    // Small enough to exhaust in a handful of operations, large enough to
    // need more than one block per file.
    Geometry::new(128, 12, 131_072, 24).unwrap()
}

#[test]
fn directory_tree_and_file_round_trip() {
    let mut volume = Volume::create_in_memory(scenario_geometry()).unwrap();

    assert!(volume.create_directory("V:\\configs").unwrap());
    assert!(volume.create_directory("V:\\configs\\prod").unwrap());
    assert!(volume.exists_directory("V:\\configs\\prod"));
    assert!(!volume.exists_directory("V:\\configs\\staging"));

    let payload: Vec<u8> = (0..900u32).map(|i| (i % 251) as u8).collect();
    volume
        .write_file_bytes("V:\\configs\\prod\\app.toml", &payload)
        .unwrap();

    assert!(volume.exists_file("V:\\configs\\prod\\app.toml"));
    assert_eq!(
        volume.read_file_bytes("V:\\configs\\prod\\app.toml").unwrap(),
        payload
    );
    assert_eq!(
        volume.list_files("V:\\configs\\prod").unwrap(),
        vec!["V:\\configs\\prod\\app.toml".to_string()]
    );
    assert_eq!(
        volume.list_subdirectories("V:\\configs").unwrap(),
        vec!["V:\\configs\\prod".to_string()]
    );
}

#[test]
fn deleting_a_file_reclaims_its_blocks() {
    let mut volume = Volume::create_in_memory(scenario_geometry()).unwrap();
    let baseline = volume.free_space().unwrap();

    let payload = vec![0x42u8; 1000];
    volume.write_file_bytes("V:\\big.bin", &payload).unwrap();
    assert!(volume.free_space().unwrap() < baseline);

    volume.delete_file("V:\\big.bin").unwrap();
    assert_eq!(volume.free_space().unwrap(), baseline);
    assert!(!volume.exists_file("V:\\big.bin"));
}

#[test]
fn creating_the_same_directory_twice_is_a_no_op() {
    let mut volume = Volume::create_in_memory(scenario_geometry()).unwrap();
    assert!(volume.create_directory("V:\\logs").unwrap());
    assert!(!volume.create_directory("V:\\logs").unwrap());
    assert_eq!(volume.list_subdirectories("V:\\").unwrap().len(), 1);
}

#[test]
fn writing_a_file_over_itself_replaces_contents_in_place() {
    let mut volume = Volume::create_in_memory(scenario_geometry()).unwrap();
    volume.write_file_bytes("V:\\note.txt", b"draft one").unwrap();
    volume.write_file_bytes("V:\\note.txt", b"final draft").unwrap();

    assert_eq!(volume.read_file_bytes("V:\\note.txt").unwrap(), b"final draft");
    assert_eq!(volume.list_files("V:\\").unwrap().len(), 1);
}

#[test]
fn missing_intermediate_segment_fails_but_missing_leaf_does_not() {
    let volume = Volume::create_in_memory(scenario_geometry()).unwrap();
    assert!(!volume.exists_file("V:\\configs\\app.toml"));
    assert!(volume.get_file("V:\\configs\\app.toml").is_err());
    assert!(!volume.exists_directory("V:\\configs"));
}

#[test]
fn image_round_trips_through_a_host_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("volume.img");

    {
        let mut volume = Volume::open(&path, scenario_geometry()).unwrap();
        volume.create_directory("V:\\configs").unwrap();
        volume
            .write_file_bytes("V:\\configs\\app.toml", b"answer = 42")
            .unwrap();
        // Dropping here flushes the image back to `path`.
    }

    let reloaded = Volume::load_from_file(&path).unwrap();
    assert!(reloaded.exists_directory("V:\\configs"));
    assert_eq!(
        reloaded.read_file_bytes("V:\\configs\\app.toml").unwrap(),
        b"answer = 42"
    );
}

#[test]
fn pointer_size_adapts_across_wildly_different_geometries() {
    let tiny = Geometry::new(64, 4, 16_384, 8).unwrap();
    assert_eq!(tiny.pointer_size, 1);

    let large = Geometry::new(4000, 12, 2_000_000_000, 24).unwrap();
    assert_eq!(large.pointer_size, 4);

    let mut volume = Volume::create_in_memory(tiny).unwrap();
    volume.write_file_bytes("V:\\a.bin", b"small volume").unwrap();
    assert_eq!(volume.read_file_bytes("V:\\a.bin").unwrap(), b"small volume");
}
