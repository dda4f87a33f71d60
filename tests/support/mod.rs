#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use mpm2midi::{
    BridgeConfig, ConversionService, ConvertError, ConvertResult, ExpandedScore, MidiHandle,
    ObjectId, PerformanceHandle, RenderOpts, ResolvedFile, ScoreHandle, ScoreSource,
};

pub const ONE_NOTE_MSM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<msm title="one note" pulsesPerQuarter="720">
  <global><dated><sequencingMap/></dated></global>
  <part name="Piano" number="1" midi.channel="0" midi.port="0">
    <dated>
      <score>
        <rest date="0.0" duration="720.0"/>
        <note date="720.0" duration="720.0" midi.pitch="60.0"/>
      </score>
    </dated>
  </part>
</msm>
"#;

pub const EMPTY_MSM: &str = r#"<msm title="empty" pulsesPerQuarter="720"><global/></msm>"#;

pub const DEFAULT_MPM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mpm xmlns="http://www.cemfi.de/mpm/ns/1.0">
  <performance name="default" pulsesPerQuarter="720">
    <global>
      <dated>
        <tempoMap>
          <tempo date="0.0" bpm="100.0" beatLength="0.25"/>
        </tempoMap>
      </dated>
    </global>
  </performance>
</mpm>
"#;

pub const NO_PERFORMANCE_MPM: &str = r#"<mpm xmlns="http://www.cemfi.de/mpm/ns/1.0"/>"#;

pub fn write_fixture(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, contents).unwrap();
    p
}

#[derive(Clone, Copy, Debug)]
pub struct Note {
    pub date: u32,
    pub duration: u32,
    pub pitch: u8,
}

/// Single-track SMF holding `notes` as note-on/note-off pairs.
pub fn smf_bytes(ppq: u16, notes: &[Note]) -> Vec<u8> {
    let mut timed: Vec<(u32, MidiMessage)> = Vec::new();
    for n in notes {
        timed.push((
            n.date,
            MidiMessage::NoteOn {
                key: n.pitch.into(),
                vel: 100.into(),
            },
        ));
        timed.push((
            n.date + n.duration,
            MidiMessage::NoteOff {
                key: n.pitch.into(),
                vel: 0.into(),
            },
        ));
    }
    timed.sort_by_key(|(t, _)| *t);

    let mut track = Vec::new();
    let mut now = 0;
    for (t, message) in timed {
        track.push(TrackEvent {
            delta: (t - now).into(),
            kind: TrackEventKind::Midi {
                channel: 0.into(),
                message,
            },
        });
        now = t;
    }
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header::new(Format::SingleTrack, Timing::Metrical(ppq.into())),
        tracks: vec![track],
    };
    let mut bytes = Vec::new();
    smf.write(&mut bytes).unwrap();
    bytes
}

#[derive(Debug)]
struct Score {
    ppq: u16,
    notes: Vec<Note>,
    rests: usize,
    expanded: bool,
}

#[derive(Debug)]
enum Object {
    Score(Score),
    Performance(usize),
    Midi { ppq: u16, notes: Vec<Note> },
}

/// In-memory stand-in for meico. Reads MSM notes with roxmltree and writes a plain SMF.
#[derive(Debug, Default)]
pub struct FakeMeico {
    next_id: u32,
    objects: BTreeMap<u32, Object>,
    /// Operation names in call order.
    pub calls: Vec<String>,
    /// Make `encode_midi` fail.
    pub fail_write: bool,
}

impl FakeMeico {
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects not yet released.
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    fn store(&mut self, obj: Object) -> ObjectId {
        self.next_id += 1;
        self.objects.insert(self.next_id, obj);
        ObjectId(self.next_id)
    }

    fn score_mut(&mut self, id: ObjectId) -> ConvertResult<&mut Score> {
        match self.objects.get_mut(&id.0) {
            Some(Object::Score(s)) => Ok(s),
            _ => Err(ConvertError::bridge(format!("no score {}", id.0))),
        }
    }
}

fn read_xml(file: &ResolvedFile) -> ConvertResult<String> {
    std::fs::read_to_string(file.path()).map_err(|e| ConvertError::invalid_input(e.to_string()))
}

fn attr_num(node: roxmltree::Node<'_, '_>, name: &str) -> f64 {
    node.attribute(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0)
}

impl ConversionService for FakeMeico {
    fn parse_score(&mut self, source: ScoreSource<'_>) -> ConvertResult<ScoreHandle> {
        let file = match source {
            ScoreSource::Msm(file) => {
                self.calls.push("parse_score:msm".into());
                file
            }
            ScoreSource::Mei { file, export } => {
                self.calls.push(format!("parse_score:mei@{}", export.ppq));
                file
            }
        };
        let text = read_xml(file)?;
        let doc = roxmltree::Document::parse(&text)
            .map_err(|e| ConvertError::invalid_input(e.to_string()))?;
        let root = doc.root_element();

        let ppq = root
            .attribute("pulsesPerQuarter")
            .and_then(|v| v.parse().ok())
            .unwrap_or(720);
        let notes: Vec<Note> = root
            .descendants()
            .filter(|n| n.has_tag_name("note"))
            .map(|n| Note {
                date: attr_num(n, "date") as u32,
                duration: attr_num(n, "duration") as u32,
                pitch: attr_num(n, "midi.pitch") as u8,
            })
            .collect();
        let rests = root.descendants().filter(|n| n.has_tag_name("rest")).count();

        let empty = notes.is_empty() && rests == 0;
        let id = self.store(Object::Score(Score {
            ppq,
            notes,
            rests,
            expanded: false,
        }));
        Ok(ScoreHandle::new(id, empty))
    }

    fn parse_performance(&mut self, mpm: &ResolvedFile) -> ConvertResult<PerformanceHandle> {
        self.calls.push("parse_performance".into());
        let text = read_xml(mpm)?;
        let doc = roxmltree::Document::parse(&text)
            .map_err(|e| ConvertError::invalid_input(e.to_string()))?;
        let count = doc
            .descendants()
            .filter(|n| n.has_tag_name("performance"))
            .count();
        let id = self.store(Object::Performance(count));
        Ok(PerformanceHandle::new(id, count))
    }

    fn strip_rests(&mut self, score: &mut ScoreHandle) -> ConvertResult<()> {
        self.calls.push("strip_rests".into());
        self.score_mut(score.id())?.rests = 0;
        Ok(())
    }

    fn expand_sequencing(&mut self, score: ScoreHandle) -> ConvertResult<ExpandedScore> {
        self.calls.push("expand_sequencing".into());
        self.score_mut(score.id())?.expanded = true;
        Ok(ExpandedScore::new(score.id()))
    }

    fn render(
        &mut self,
        score: &ExpandedScore,
        performance: &PerformanceHandle,
        opts: RenderOpts,
    ) -> ConvertResult<MidiHandle> {
        self.calls.push(format!("render:{}", opts.performance_index));
        if opts.performance_index >= performance.performance_count() {
            return Err(ConvertError::invalid_input("no such performance"));
        }
        let s = self.score_mut(score.id())?;
        if !s.expanded || s.rests != 0 {
            return Err(ConvertError::bridge("score rendered before rests/expansion"));
        }
        let midi = Object::Midi {
            ppq: s.ppq,
            notes: s.notes.clone(),
        };
        Ok(MidiHandle::new(self.store(midi)))
    }

    fn encode_midi(&mut self, midi: &MidiHandle, out: &Path) -> ConvertResult<()> {
        self.calls.push("encode_midi".into());
        if self.fail_write {
            return Err(ConvertError::write("simulated write failure"));
        }
        let Some(Object::Midi { ppq, notes }) = self.objects.get(&midi.id().0) else {
            return Err(ConvertError::bridge("no such midi"));
        };

        let bytes = smf_bytes(*ppq, notes);
        std::fs::write(out, bytes).map_err(|e| ConvertError::write(e.to_string()))
    }

    fn release(&mut self, ids: &[ObjectId]) -> ConvertResult<()> {
        self.calls.push("release".into());
        for id in ids {
            self.objects.remove(&id.0);
        }
        Ok(())
    }
}

/// Shell script that speaks the bridge protocol without a JVM.
///
/// It is run as `/bin/sh <script> -cp <jar> <host.java>`, so nothing written here is executed
/// directly. Every pipeline request succeeds: `render` hands out object 3 and `write` copies a
/// one-note SMF (middle C, 720 PPQ) to the requested path. MEI export is unsupported.
/// With `crash_on` set, the script exits silently when it sees that request.
pub fn fake_host_script(dir: &Path, invalid_msm: bool, crash_on: Option<&str>) -> PathBuf {
    let rendered = dir.join("rendered.mid");
    let one_note = Note {
        date: 720,
        duration: 720,
        pitch: 60,
    };
    std::fs::write(&rendered, smf_bytes(720, &[one_note])).unwrap();

    let msm_reply = if invalid_msm {
        r"printf 'err\tinvalid\tMSM file is not valid. boom\n'"
    } else {
        r"printf 'ok\t1\tfalse\n'"
    };
    let crash = crash_on
        .map(|c| format!("    {c}*) exit 3 ;;\n"))
        .unwrap_or_default();
    let script = format!(
        r#"printf 'ready\tfake-meico\n'
while IFS= read -r line; do
  case $line in
{crash}    quit) printf 'ok\n'; exit 0 ;;
    msm*) {msm_reply} ;;
    mpm*) printf 'ok\t2\t1\n' ;;
    render*) printf 'ok\t3\n' ;;
    write*)
      out=$(printf '%s\n' "$line" | cut -f3)
      if cp "{rendered}" "$out"; then printf 'ok\n'; else printf 'err\twrite\tcannot write %s\n' "$out"; fi ;;
    strip*|expand*|release*) printf 'ok\n' ;;
    *) printf 'err\tfailed\tunsupported\n' ;;
  esac
done
"#,
        rendered = rendered.display()
    );
    let path = dir.join("fake-host.sh");
    std::fs::write(&path, script).unwrap();
    std::fs::write(dir.join("meico.jar"), b"PK\x03\x04").unwrap();
    path
}

/// Bridge config launching [`fake_host_script`] through `/bin/sh`.
pub fn fake_bridge_config(dir: &Path, script: &Path) -> BridgeConfig {
    BridgeConfig {
        java: PathBuf::from("/bin/sh"),
        artifact: dir.join("meico.jar"),
        jvm_args: vec![script.to_string_lossy().into_owned()],
    }
}
