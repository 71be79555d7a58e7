//! Tag keys and the row format used to pass tags across the boundary.
//!
//! Tags travel as rows of `KEY\tVALUE`. A key with several values is sent as
//! one row with the values joined by `\v`; a key with an empty value tells
//! the guest to remove that tag.

use std::collections::BTreeMap;
use std::ops::{BitOr, BitOrAssign};

use tracing::debug;

/// Tag map: normalized key to its values, in file order.
pub type Tags = BTreeMap<String, Vec<String>>;

const FIELD_SEPARATOR: char = '\t';
const VALUE_SEPARATOR: char = '\u{000B}';

/// Options for [`crate::TagLib::write_tags`], combinable with `|`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WriteOptions(u8);

impl WriteOptions {
    /// Remove every existing tag that is not in the written map.
    pub const CLEAR: Self = Self(1);

    /// No options: merge into the existing tags.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bits, as passed to the guest.
    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for WriteOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for WriteOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Encode a tag map as guest rows.
///
/// Keys with no values, or only empty values, become `KEY\t`, which the
/// guest treats as removal.
pub fn encode_rows(tags: &Tags) -> Vec<String> {
    tags.iter()
        .map(|(key, values)| {
            if values.iter().all(String::is_empty) {
                return format!("{key}{FIELD_SEPARATOR}");
            }
            let joined = values.join(&VALUE_SEPARATOR.to_string());
            format!("{key}{FIELD_SEPARATOR}{joined}")
        })
        .collect()
}

/// Decode guest rows into a tag map. Rows without a separator are skipped.
pub fn decode_rows(rows: Vec<String>) -> Tags {
    let mut tags = Tags::new();
    for row in rows {
        let Some((key, value)) = row.split_once(FIELD_SEPARATOR) else {
            debug!(row = %row, "Skipping tag row without a key separator");
            continue;
        };
        tags.entry(key.to_string())
            .or_default()
            .extend(value.split(VALUE_SEPARATOR).map(str::to_string));
    }
    tags
}

pub const ACOUSTID_FINGERPRINT: &str = "ACOUSTID_FINGERPRINT";
pub const ACOUSTID_ID: &str = "ACOUSTID_ID";
pub const ALBUM: &str = "ALBUM";
pub const ALBUM_ARTIST: &str = "ALBUMARTIST";
pub const ALBUM_ARTIST_SORT: &str = "ALBUMARTISTSORT";
pub const ALBUM_SORT: &str = "ALBUMSORT";
pub const ARRANGER: &str = "ARRANGER";
pub const ARTIST: &str = "ARTIST";
pub const ARTISTS: &str = "ARTISTS";
pub const ARTIST_SORT: &str = "ARTISTSORT";
pub const ARTIST_WEBPAGE: &str = "ARTISTWEBPAGE";
pub const ASIN: &str = "ASIN";
pub const AUDIO_SOURCE_WEBPAGE: &str = "AUDIOSOURCEWEBPAGE";
pub const BARCODE: &str = "BARCODE";
pub const BPM: &str = "BPM";
pub const CATALOG_NUMBER: &str = "CATALOGNUMBER";
pub const COMMENT: &str = "COMMENT";
pub const COMPILATION: &str = "COMPILATION";
pub const COMPOSER: &str = "COMPOSER";
pub const COMPOSER_SORT: &str = "COMPOSERSORT";
pub const CONDUCTOR: &str = "CONDUCTOR";
pub const COPYRIGHT: &str = "COPYRIGHT";
pub const COPYRIGHT_URL: &str = "COPYRIGHTURL";
pub const DATE: &str = "DATE";
pub const DISC_NUMBER: &str = "DISCNUMBER";
pub const DISC_SUBTITLE: &str = "DISCSUBTITLE";
pub const DJ_MIXER: &str = "DJMIXER";
pub const ENCODED_BY: &str = "ENCODEDBY";
pub const ENCODING: &str = "ENCODING";
pub const ENCODING_TIME: &str = "ENCODINGTIME";
pub const ENGINEER: &str = "ENGINEER";
pub const FILE_TYPE: &str = "FILETYPE";
pub const FILE_WEBPAGE: &str = "FILEWEBPAGE";
pub const GAPLESS_PLAYBACK: &str = "GAPLESSPLAYBACK";
pub const GENRE: &str = "GENRE";
pub const GROUPING: &str = "GROUPING";
pub const INITIAL_KEY: &str = "INITIALKEY";
pub const INVOLVED_PEOPLE: &str = "INVOLVEDPEOPLE";
pub const ISRC: &str = "ISRC";
pub const LABEL: &str = "LABEL";
pub const LANGUAGE: &str = "LANGUAGE";
pub const LENGTH: &str = "LENGTH";
pub const LICENSE: &str = "LICENSE";
pub const LYRICIST: &str = "LYRICIST";
pub const LYRICS: &str = "LYRICS";
pub const MEDIA: &str = "MEDIA";
pub const MIXER: &str = "MIXER";
pub const MOOD: &str = "MOOD";
pub const MOVEMENT_COUNT: &str = "MOVEMENTCOUNT";
pub const MOVEMENT_NAME: &str = "MOVEMENTNAME";
pub const MOVEMENT_NUMBER: &str = "MOVEMENTNUMBER";
pub const MUSICBRAINZ_ALBUM_ID: &str = "MUSICBRAINZ_ALBUMID";
pub const MUSICBRAINZ_ALBUM_ARTIST_ID: &str = "MUSICBRAINZ_ALBUMARTISTID";
pub const MUSICBRAINZ_ARTIST_ID: &str = "MUSICBRAINZ_ARTISTID";
pub const MUSICBRAINZ_RELEASE_GROUP_ID: &str = "MUSICBRAINZ_RELEASEGROUPID";
pub const MUSICBRAINZ_RELEASE_TRACK_ID: &str = "MUSICBRAINZ_RELEASETRACKID";
pub const MUSICBRAINZ_TRACK_ID: &str = "MUSICBRAINZ_TRACKID";
pub const MUSICBRAINZ_WORK_ID: &str = "MUSICBRAINZ_WORKID";
pub const MUSICIAN_CREDITS: &str = "MUSICIANCREDITS";
pub const MUSICIP_PUID: &str = "MUSICIP_PUID";
pub const ORIGINAL_ALBUM: &str = "ORIGINALALBUM";
pub const ORIGINAL_ARTIST: &str = "ORIGINALARTIST";
pub const ORIGINAL_DATE: &str = "ORIGINALDATE";
pub const ORIGINAL_FILENAME: &str = "ORIGINALFILENAME";
pub const ORIGINAL_LYRICIST: &str = "ORIGINALLYRICIST";
pub const OWNER: &str = "OWNER";
pub const PAYMENT_WEBPAGE: &str = "PAYMENTWEBPAGE";
pub const PERFORMER: &str = "PERFORMER";
pub const PLAYLIST_DELAY: &str = "PLAYLISTDELAY";
pub const PODCAST: &str = "PODCAST";
pub const PODCAST_CATEGORY: &str = "PODCASTCATEGORY";
pub const PODCAST_DESC: &str = "PODCASTDESC";
pub const PODCAST_ID: &str = "PODCASTID";
pub const PODCAST_URL: &str = "PODCASTURL";
pub const PRODUCED_NOTICE: &str = "PRODUCEDNOTICE";
pub const PRODUCER: &str = "PRODUCER";
pub const PUBLISHER_WEBPAGE: &str = "PUBLISHERWEBPAGE";
pub const RADIO_STATION: &str = "RADIOSTATION";
pub const RADIO_STATION_OWNER: &str = "RADIOSTATIONOWNER";
pub const RADIO_STATION_WEBPAGE: &str = "RADIOSTATIONWEBPAGE";
pub const RELEASE_COUNTRY: &str = "RELEASECOUNTRY";
pub const RELEASE_DATE: &str = "RELEASEDATE";
pub const RELEASE_STATUS: &str = "RELEASESTATUS";
pub const RELEASE_TYPE: &str = "RELEASETYPE";
pub const REMIXER: &str = "REMIXER";
pub const SCRIPT: &str = "SCRIPT";
pub const SHOW_SORT: &str = "SHOWSORT";
pub const SHOW_WORK_MOVEMENT: &str = "SHOWWORKMOVEMENT";
pub const SUBTITLE: &str = "SUBTITLE";
pub const TAGGING_DATE: &str = "TAGGINGDATE";
pub const TITLE: &str = "TITLE";
pub const TITLE_SORT: &str = "TITLESORT";
pub const TRACK_NUMBER: &str = "TRACKNUMBER";
pub const TV_EPISODE: &str = "TVEPISODE";
pub const TV_EPISODE_ID: &str = "TVEPISODEID";
pub const TV_NETWORK: &str = "TVNETWORK";
pub const TV_SEASON: &str = "TVSEASON";
pub const TV_SHOW: &str = "TVSHOW";
pub const URL: &str = "URL";
pub const WORK: &str = "WORK";
