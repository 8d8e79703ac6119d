//! JavaScript sources evaluated inside the page.

/// Name of the page-side helper object installed at document start.
pub(crate) const HELPER_NAME: &str = "__deepdriver__";

/// Marker class of the spliced init script tag, used for self-removal.
pub(crate) const INIT_SCRIPT_CLASS: &str = "__deepdriver_init__";

/// Document-start helper giving the engine access to closed shadow roots and
/// deep (shadow-piercing) XPath/CSS/text resolution.
///
/// `attachShadow` is patched before any page script runs so closed roots are
/// captured at creation time; declarative shadow roots that already exist are
/// re-registered from their host's `shadowRoot` property where available.
pub(crate) const PIERCER_JS: &str = r#"(() => {
  if (window.__deepdriver__) return;

  const closedRoots = new WeakMap();

  const nativeAttachShadow = Element.prototype.attachShadow;
  Element.prototype.attachShadow = function (init) {
    const root = nativeAttachShadow.call(this, init);
    if (init && init.mode === 'closed') {
      closedRoots.set(this, root);
    }
    return root;
  };

  function getClosedRoot(host) {
    return closedRoots.get(host) || null;
  }

  function anyRoot(host) {
    return host.shadowRoot || getClosedRoot(host) || null;
  }

  // declarative shadow DOM attaches before our patch can observe it
  function rescan(root) {
    for (const el of (root || document).querySelectorAll('*')) {
      const sr = anyRoot(el);
      if (sr) rescan(sr);
    }
  }

  function childElements(node) {
    const out = [];
    const sr = node instanceof Element ? anyRoot(node) : null;
    if (sr) out.push(...sr.children);
    if (node.children) out.push(...node.children);
    return out;
  }

  function parseXPathSteps(xp) {
    const steps = [];
    let i = 0;
    while (i < xp.length) {
      let deep = false;
      if (xp[i] !== '/') return null;
      i += 1;
      if (xp[i] === '/') { deep = true; i += 1; }
      let j = i;
      while (j < xp.length && xp[j] !== '/') j += 1;
      const raw = xp.slice(i, j);
      i = j;
      if (!raw) continue;
      const m = raw.match(/^([^\[]+)(?:\[(\d+)\])?$/);
      if (!m) return null;
      steps.push({ tag: m[1].toLowerCase(), index: m[2] ? parseInt(m[2], 10) : null, deep });
    }
    return steps;
  }

  function stepMatches(contexts, step) {
    const out = [];
    for (const ctx of contexts) {
      let candidates;
      if (step.deep) {
        candidates = [];
        const stack = [...childElements(ctx)];
        while (stack.length) {
          const n = stack.shift();
          candidates.push(n);
          stack.push(...childElements(n));
        }
      } else {
        candidates = childElements(ctx);
      }
      let matched = candidates.filter(
        (el) => step.tag === '*' || el.localName === step.tag
      );
      if (step.index != null) {
        matched = matched[step.index - 1] ? [matched[step.index - 1]] : [];
      }
      out.push(...matched);
    }
    return out;
  }

  // resolves an absolute path of `tag[n]` steps, crossing shadow roots
  function resolveSimpleXPath(xp) {
    try {
      const native = document.evaluate(
        xp, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null
      );
      if (native && native.singleNodeValue) return native.singleNodeValue;
    } catch (e) { /* fall through to the manual walk */ }

    const steps = parseXPathSteps(xp);
    if (!steps) return null;
    let contexts = [document];
    for (const step of steps) {
      contexts = stepMatches(contexts, step);
      if (!contexts.length) return null;
    }
    return contexts[0] || null;
  }

  function queryDeepAll(selector, root, out) {
    root = root || document;
    out = out || [];
    try {
      out.push(...root.querySelectorAll(selector));
    } catch (e) {
      return out;
    }
    for (const el of root.querySelectorAll('*')) {
      const sr = anyRoot(el);
      if (sr) queryDeepAll(selector, sr, out);
    }
    return out;
  }

  function queryDeepFirst(selector, root) {
    const all = queryDeepAll(selector, root);
    return all.length ? all[0] : null;
  }

  const TEXT_SKIP = new Set([
    'script', 'style', 'head', 'meta', 'link', 'noscript', 'template', 'title'
  ]);

  function textSearchAll(query) {
    const matches = [];
    (function walk(root) {
      for (const el of root.querySelectorAll('*')) {
        if (TEXT_SKIP.has(el.localName)) continue;
        const sr = anyRoot(el);
        if (sr) walk(sr);
        const text = el.textContent;
        if (text && text.includes(query)) matches.push(el);
      }
    })(document);
    // keep only matches that do not contain another match
    const innermost = matches.filter(
      (m) => !matches.some((o) => o !== m && m.contains(o))
    );
    if (innermost.length) return innermost;
    return matches.length ? [matches[matches.length - 1]] : [];
  }

  function xpathOfNode(node) {
    const segments = [];
    let current = node;
    while (current && current.nodeType === Node.ELEMENT_NODE) {
      const parent = current.parentNode;
      let index = 1;
      if (parent) {
        for (const sibling of parent.children) {
          if (sibling === current) break;
          if (sibling.localName === current.localName) index += 1;
        }
      }
      segments.unshift(current.localName + '[' + index + ']');
      if (parent instanceof ShadowRoot) {
        current = parent.host;
        segments.unshift('');
      } else {
        current = parent && parent.nodeType === Node.ELEMENT_NODE ? parent : null;
      }
    }
    return '/' + segments.join('/');
  }

  // deepest element at a viewport point, descending through shadow roots
  function deepElementFromPoint(x, y) {
    let el = document.elementFromPoint(x, y);
    while (el) {
      const sr = anyRoot(el);
      const next = sr ? sr.elementFromPoint(x, y) : null;
      if (!next || next === el) break;
      el = next;
    }
    return el;
  }

  window.__deepdriver__ = {
    getClosedRoot,
    rescan,
    resolveSimpleXPath,
    queryDeepFirst,
    queryDeepAll,
    textSearchAll,
    xpathOfNode,
    deepElementFromPoint,
  };
  rescan(document);
})();"#;

/// Optional visual cursor overlay updated on synthesized mouse moves.
///
/// Moves requested before the document body exists are buffered and replayed
/// once the overlay can be installed.
pub(crate) const CURSOR_OVERLAY_JS: &str = r#"(() => {
  if (window.__deepdriver_cursor__) return;

  let dot = null;
  const pending = [];

  function ensure() {
    if (dot || !document.body) return;
    dot = document.createElement('div');
    dot.style.cssText = [
      'position:fixed', 'z-index:2147483647', 'pointer-events:none',
      'width:14px', 'height:14px', 'border-radius:50%',
      'background:rgba(255,64,64,0.75)', 'border:2px solid #fff',
      'box-shadow:0 0 4px rgba(0,0,0,0.5)',
      'transform:translate(-50%,-50%)', 'left:0', 'top:0'
    ].join(';');
    document.body.appendChild(dot);
    while (pending.length) {
      const [x, y] = pending.shift();
      dot.style.left = x + 'px';
      dot.style.top = y + 'px';
    }
  }

  function move(x, y) {
    ensure();
    if (!dot) {
      pending.push([x, y]);
      return;
    }
    dot.style.left = x + 'px';
    dot.style.top = y + 'px';
  }

  window.__deepdriver_cursor__ = { move };
  if (document.readyState === 'loading') {
    document.addEventListener('DOMContentLoaded', ensure);
  } else {
    ensure();
  }
})();"#;
