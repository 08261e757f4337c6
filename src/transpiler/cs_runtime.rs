//! The C# support library generated programs link against.
//!
//! `RUNTIME_BODY` holds the `Pyxlate.Runtime` namespace: the `PyObject` and
//! `PyException` base types plus the `py_runtime` helper class. Its type
//! lattice stamps ids with the same sorted pre-order walk as
//! [`crate::lattice::TypeLattice`], so the `// type_id N` comments in generated
//! registration code match what the runtime hands out.

/// Namespaces every generated program imports.
pub const USINGS: &[&str] = &[
    "System",
    "System.Collections.Generic",
    "System.Linq",
    "Pyxlate.Runtime",
];

pub const RUNTIME_BODY: &str = r##"namespace Pyxlate.Runtime {
    using System;
    using System.Collections;
    using System.Collections.Generic;
    using System.Globalization;
    using System.Linq;
    using System.Reflection;
    using System.Text;

    public class PyObject {
        public long pytra_type_id;
    }

    public class PyException : Exception {
        public readonly object payload;

        public PyException(object payload) : base(py_runtime.py_str(payload)) {
            this.payload = payload;
        }
    }

    public static class py_runtime {
        public const long PYTRA_TID_NONE = 0;
        public const long PYTRA_TID_BOOL = 1;
        public const long PYTRA_TID_INT = 2;
        public const long PYTRA_TID_FLOAT = 3;
        public const long PYTRA_TID_STR = 4;
        public const long PYTRA_TID_LIST = 5;
        public const long PYTRA_TID_DICT = 6;
        public const long PYTRA_TID_SET = 7;
        public const long PYTRA_TID_OBJECT = 8;
        const long FIRST_USER_TYPE_ID = 1000;

        static readonly object type_lock = new object();
        static readonly Dictionary<long, long> type_parent = new Dictionary<long, long>();
        static readonly SortedDictionary<long, List<long>> type_children = new SortedDictionary<long, List<long>>();
        static readonly Dictionary<long, long[]> type_interval = new Dictionary<long, long[]>();
        static long next_user_type_id = FIRST_USER_TYPE_ID;
        static bool builtins_ready;

        static void ensure_builtins() {
            lock (type_lock) {
                if (builtins_ready) {
                    return;
                }
                builtins_ready = true;
                add_type(PYTRA_TID_NONE, -1);
                add_type(PYTRA_TID_OBJECT, -1);
                add_type(PYTRA_TID_INT, PYTRA_TID_OBJECT);
                add_type(PYTRA_TID_BOOL, PYTRA_TID_INT);
                add_type(PYTRA_TID_FLOAT, PYTRA_TID_OBJECT);
                add_type(PYTRA_TID_STR, PYTRA_TID_OBJECT);
                add_type(PYTRA_TID_LIST, PYTRA_TID_OBJECT);
                add_type(PYTRA_TID_DICT, PYTRA_TID_OBJECT);
                add_type(PYTRA_TID_SET, PYTRA_TID_OBJECT);
                recompute_intervals();
            }
        }

        static void add_type(long id, long parent) {
            type_parent[id] = parent;
            if (!type_children.ContainsKey(id)) {
                type_children[id] = new List<long>();
            }
            if (parent >= 0) {
                type_children[parent].Add(id);
                type_children[parent].Sort();
            }
        }

        static void recompute_intervals() {
            type_interval.Clear();
            long counter = 0;
            foreach (KeyValuePair<long, List<long>> entry in type_children) {
                if (type_parent[entry.Key] < 0) {
                    stamp(entry.Key, ref counter);
                }
            }
        }

        static void stamp(long id, ref long counter) {
            long order = counter;
            counter += 1;
            foreach (long child in type_children[id]) {
                stamp(child, ref counter);
            }
            type_interval[id] = new long[] { order, order, counter - 1 };
        }

        public static long py_register_class_type(long base_type_id) {
            ensure_builtins();
            lock (type_lock) {
                if (!type_parent.ContainsKey(base_type_id)) {
                    throw new ArgumentException("unknown base type id " + base_type_id);
                }
                long id = next_user_type_id;
                next_user_type_id += 1;
                add_type(id, base_type_id);
                recompute_intervals();
                return id;
            }
        }

        public static long py_runtime_type_id(object value) {
            if (value == null) {
                return PYTRA_TID_NONE;
            }
            if (value is bool) {
                return PYTRA_TID_BOOL;
            }
            if (value is long || value is int || value is byte || value is short) {
                return PYTRA_TID_INT;
            }
            if (value is double || value is float) {
                return PYTRA_TID_FLOAT;
            }
            if (value is string) {
                return PYTRA_TID_STR;
            }
            PyObject obj = value as PyObject;
            if (obj != null) {
                return obj.pytra_type_id == 0 ? PYTRA_TID_OBJECT : obj.pytra_type_id;
            }
            if (value is IList) {
                return PYTRA_TID_LIST;
            }
            if (value is IDictionary) {
                return PYTRA_TID_DICT;
            }
            if (is_set(value)) {
                return PYTRA_TID_SET;
            }
            return PYTRA_TID_OBJECT;
        }

        public static bool py_is_subtype(long actual, long expected) {
            ensure_builtins();
            lock (type_lock) {
                long[] actual_interval;
                long[] expected_interval;
                if (!type_interval.TryGetValue(actual, out actual_interval)) {
                    return false;
                }
                if (!type_interval.TryGetValue(expected, out expected_interval)) {
                    return false;
                }
                return expected_interval[1] <= actual_interval[0] && actual_interval[0] <= expected_interval[2];
            }
        }

        public static bool py_issubclass(long actual, long expected) {
            return py_is_subtype(actual, expected);
        }

        public static bool py_isinstance(object value, long expected) {
            return py_is_subtype(py_runtime_type_id(value), expected);
        }

        public static void py_discard(object value) {
        }

        // Matched by built-in handlers with no dedicated .NET exception.
        public static bool py_is_plain_error(Exception ex) {
            return !(ex is PyException)
                && !(ex is DivideByZeroException)
                && !(ex is KeyNotFoundException)
                && !(ex is IndexOutOfRangeException);
        }

        // Arithmetic with Python's sign and division rules.

        public static double py_div(long a, long b) {
            if (b == 0) {
                throw new DivideByZeroException("division by zero");
            }
            return (double)a / (double)b;
        }

        public static double py_div(double a, double b) {
            if (b == 0.0) {
                throw new DivideByZeroException("float division by zero");
            }
            return a / b;
        }

        public static double py_div(object a, object b) {
            return py_div(to_double(a), to_double(b));
        }

        public static long py_floordiv(long a, long b) {
            if (b == 0) {
                throw new DivideByZeroException("integer division or modulo by zero");
            }
            long quotient = a / b;
            if (a % b != 0 && ((a < 0) != (b < 0))) {
                quotient -= 1;
            }
            return quotient;
        }

        public static double py_floordiv(double a, double b) {
            if (b == 0.0) {
                throw new DivideByZeroException("float floor division by zero");
            }
            return Math.Floor(a / b);
        }

        public static object py_floordiv(object a, object b) {
            if (is_float(a) || is_float(b)) {
                return py_floordiv(to_double(a), to_double(b));
            }
            return py_floordiv(to_long(a), to_long(b));
        }

        public static long py_mod(long a, long b) {
            if (b == 0) {
                throw new DivideByZeroException("integer division or modulo by zero");
            }
            long remainder = a % b;
            if (remainder != 0 && ((remainder < 0) != (b < 0))) {
                remainder += b;
            }
            return remainder;
        }

        public static double py_mod(double a, double b) {
            if (b == 0.0) {
                throw new DivideByZeroException("float modulo");
            }
            double remainder = a % b;
            if (remainder != 0.0 && ((remainder < 0) != (b < 0))) {
                remainder += b;
            }
            return remainder;
        }

        public static object py_mod(object a, object b) {
            if (is_float(a) || is_float(b)) {
                return py_mod(to_double(a), to_double(b));
            }
            return py_mod(to_long(a), to_long(b));
        }

        public static long py_pow(long value, long exponent) {
            if (exponent < 0) {
                throw new ArgumentException("negative exponent needs a float base");
            }
            long result = 1;
            long factor = value;
            while (exponent > 0) {
                if ((exponent & 1) == 1) {
                    result = unchecked(result * factor);
                }
                factor = unchecked(factor * factor);
                exponent >>= 1;
            }
            return result;
        }

        public static double py_pow(double value, double exponent) {
            return Math.Pow(value, exponent);
        }

        public static object py_pow(object value, object exponent) {
            if (is_float(value) || is_float(exponent) || to_long(exponent) < 0) {
                return py_pow(to_double(value), to_double(exponent));
            }
            return py_pow(to_long(value), to_long(exponent));
        }

        // Indexing, slicing and membership.

        static int normalize_index(long index, int count) {
            long position = index < 0 ? index + count : index;
            if (position < 0 || position >= count) {
                throw new IndexOutOfRangeException("index out of range");
            }
            return (int)position;
        }

        static void clamp_slice(long? lower, long? upper, int count, out int start, out int length) {
            long from = lower ?? 0;
            long to = upper ?? count;
            if (from < 0) {
                from += count;
            }
            if (to < 0) {
                to += count;
            }
            from = Math.Max(0, Math.Min(from, count));
            to = Math.Max(0, Math.Min(to, count));
            start = (int)from;
            length = to > from ? (int)(to - from) : 0;
        }

        public static List<T> py_slice<T>(List<T> items, long? lower, long? upper) {
            int start;
            int length;
            clamp_slice(lower, upper, items.Count, out start, out length);
            return items.GetRange(start, length);
        }

        public static string py_slice(string text, long? lower, long? upper) {
            int start;
            int length;
            clamp_slice(lower, upper, text.Length, out start, out length);
            return text.Substring(start, length);
        }

        public static T py_get<T>(List<T> items, long index) {
            return items[normalize_index(index, items.Count)];
        }

        public static string py_get(string text, long index) {
            return text[normalize_index(index, text.Length)].ToString();
        }

        public static V py_get<K, V>(Dictionary<K, V> items, K key) {
            V value;
            if (!items.TryGetValue(key, out value)) {
                throw new KeyNotFoundException(py_repr(key));
            }
            return value;
        }

        public static object py_get(object container, object index) {
            string text = container as string;
            if (text != null) {
                return py_get(text, to_long(index));
            }
            IList list = container as IList;
            if (list != null) {
                return list[normalize_index(to_long(index), list.Count)];
            }
            IDictionary dict = container as IDictionary;
            if (dict != null) {
                if (!dict.Contains(index)) {
                    throw new KeyNotFoundException(py_repr(index));
                }
                return dict[index];
            }
            if (is_tuple(container)) {
                List<object> items = tuple_items(container);
                return items[normalize_index(to_long(index), items.Count)];
            }
            throw new ArgumentException("object is not subscriptable");
        }

        public static void py_set<T>(List<T> items, long index, T value) {
            items[normalize_index(index, items.Count)] = value;
        }

        public static void py_set(List<byte> items, long index, long value) {
            items[normalize_index(index, items.Count)] = to_byte(value);
        }

        public static void py_set<K, V>(Dictionary<K, V> items, K key, V value) {
            items[key] = value;
        }

        public static void py_set(object container, object index, object value) {
            IList list = container as IList;
            if (list != null) {
                Type element = element_type(container);
                object stored = value;
                if (element != null && value is IConvertible && !element.IsInstanceOfType(value)) {
                    stored = Convert.ChangeType(value, element, CultureInfo.InvariantCulture);
                }
                list[normalize_index(to_long(index), list.Count)] = stored;
                return;
            }
            IDictionary dict = container as IDictionary;
            if (dict != null) {
                dict[index] = value;
                return;
            }
            throw new ArgumentException("object does not support item assignment");
        }

        public static long py_len(string text) {
            long count = 0;
            for (int i = 0; i < text.Length; i++) {
                if (!char.IsLowSurrogate(text[i])) {
                    count += 1;
                }
            }
            return count;
        }

        public static long py_len<T>(ICollection<T> items) {
            return items.Count;
        }

        public static long py_len(object value) {
            string text = value as string;
            if (text != null) {
                return py_len(text);
            }
            ICollection collection = value as ICollection;
            if (collection != null) {
                return collection.Count;
            }
            if (is_tuple(value)) {
                return tuple_items(value).Count;
            }
            IEnumerable sequence = value as IEnumerable;
            if (sequence != null) {
                long count = 0;
                foreach (object item in sequence) {
                    count += 1;
                }
                return count;
            }
            throw new ArgumentException("object has no len()");
        }

        public static bool py_in(string needle, string haystack) {
            return haystack.IndexOf(needle, StringComparison.Ordinal) >= 0;
        }

        public static bool py_in<T>(T item, ICollection<T> items) {
            return items.Contains(item);
        }

        public static bool py_in<K, V>(K key, Dictionary<K, V> items) {
            return items.ContainsKey(key);
        }

        public static bool py_in(object needle, object haystack) {
            string text = haystack as string;
            if (text != null) {
                return py_in(py_str(needle), text);
            }
            IDictionary dict = haystack as IDictionary;
            if (dict != null) {
                return dict.Contains(needle);
            }
            foreach (object item in py_iter(haystack)) {
                if (py_eq(item, needle)) {
                    return true;
                }
            }
            return false;
        }

        // Truthiness, equality and ordering.

        public static bool py_bool(bool value) {
            return value;
        }

        public static bool py_bool(long value) {
            return value != 0;
        }

        public static bool py_bool(double value) {
            return value != 0.0;
        }

        public static bool py_bool(string value) {
            return !string.IsNullOrEmpty(value);
        }

        public static bool py_bool(object value) {
            if (value == null) {
                return false;
            }
            if (value is bool) {
                return (bool)value;
            }
            if (is_float(value)) {
                return to_double(value) != 0.0;
            }
            if (is_number(value)) {
                return to_long(value) != 0;
            }
            string text = value as string;
            if (text != null) {
                return text.Length > 0;
            }
            ICollection collection = value as ICollection;
            if (collection != null) {
                return collection.Count > 0;
            }
            if (is_set(value)) {
                return py_len(value) > 0;
            }
            return true;
        }

        public static bool py_eq(long a, long b) {
            return a == b;
        }

        public static bool py_eq(double a, double b) {
            return a == b;
        }

        public static bool py_eq(string a, string b) {
            return string.Equals(a, b, StringComparison.Ordinal);
        }

        public static bool py_eq(object a, object b) {
            if (a == null || b == null) {
                return a == null && b == null;
            }
            if (is_number(a) && is_number(b)) {
                if (is_float(a) || is_float(b)) {
                    return to_double(a) == to_double(b);
                }
                return to_long(a) == to_long(b);
            }
            string text = a as string;
            if (text != null) {
                return b is string && string.Equals(text, (string)b, StringComparison.Ordinal);
            }
            IDictionary left_dict = a as IDictionary;
            IDictionary right_dict = b as IDictionary;
            if (left_dict != null && right_dict != null) {
                if (left_dict.Count != right_dict.Count) {
                    return false;
                }
                foreach (DictionaryEntry entry in left_dict) {
                    if (!right_dict.Contains(entry.Key) || !py_eq(entry.Value, right_dict[entry.Key])) {
                        return false;
                    }
                }
                return true;
            }
            if (is_set(a) && is_set(b)) {
                List<object> left_items = py_iter(a);
                List<object> right_items = py_iter(b);
                return left_items.Count == right_items.Count && left_items.All(item => py_in(item, b));
            }
            if ((a is IList && b is IList) || (is_tuple(a) && is_tuple(b))) {
                List<object> left_items = py_iter(a);
                List<object> right_items = py_iter(b);
                if (left_items.Count != right_items.Count) {
                    return false;
                }
                for (int i = 0; i < left_items.Count; i++) {
                    if (!py_eq(left_items[i], right_items[i])) {
                        return false;
                    }
                }
                return true;
            }
            return a.Equals(b);
        }

        public static int py_cmp(long a, long b) {
            return a.CompareTo(b);
        }

        public static int py_cmp(double a, double b) {
            return a.CompareTo(b);
        }

        public static int py_cmp(string a, string b) {
            return Math.Sign(string.CompareOrdinal(a, b));
        }

        public static int py_cmp(object a, object b) {
            if (is_number(a) && is_number(b)) {
                if (is_float(a) || is_float(b)) {
                    return to_double(a).CompareTo(to_double(b));
                }
                return to_long(a).CompareTo(to_long(b));
            }
            string left_text = a as string;
            string right_text = b as string;
            if (left_text != null && right_text != null) {
                return py_cmp(left_text, right_text);
            }
            if ((a is IList && b is IList) || (is_tuple(a) && is_tuple(b))) {
                List<object> left_items = py_iter(a);
                List<object> right_items = py_iter(b);
                int shared = Math.Min(left_items.Count, right_items.Count);
                for (int i = 0; i < shared; i++) {
                    int order = py_cmp(left_items[i], right_items[i]);
                    if (order != 0) {
                        return order;
                    }
                }
                return left_items.Count.CompareTo(right_items.Count);
            }
            throw new ArgumentException("'<' not supported between instances of '" + type_name(a) + "' and '" + type_name(b) + "'");
        }

        // Sequence construction.

        public static List<T> py_concat<T>(List<T> left, List<T> right) {
            List<T> result = new List<T>(left.Count + right.Count);
            result.AddRange(left);
            result.AddRange(right);
            return result;
        }

        public static string py_repeat(string text, long count) {
            if (count <= 0) {
                return "";
            }
            StringBuilder builder = new StringBuilder(text.Length * (int)count);
            for (long i = 0; i < count; i++) {
                builder.Append(text);
            }
            return builder.ToString();
        }

        public static List<T> py_repeat<T>(List<T> items, long count) {
            List<T> result = new List<T>();
            for (long i = 0; i < count; i++) {
                result.AddRange(items);
            }
            return result;
        }

        public static List<long> py_range(long stop) {
            return py_range(0, stop, 1);
        }

        public static List<long> py_range(long start, long stop) {
            return py_range(start, stop, 1);
        }

        public static List<long> py_range(long start, long stop, long step) {
            if (step == 0) {
                throw new ArgumentException("range() arg 3 must not be zero");
            }
            List<long> result = new List<long>();
            if (step > 0) {
                for (long i = start; i < stop; i += step) {
                    result.Add(i);
                }
            } else {
                for (long i = start; i > stop; i += step) {
                    result.Add(i);
                }
            }
            return result;
        }

        public static List<K> py_keys<K, V>(Dictionary<K, V> items) {
            return new List<K>(items.Keys);
        }

        public static List<V> py_values<K, V>(Dictionary<K, V> items) {
            return new List<V>(items.Values);
        }

        public static List<Tuple<K, V>> py_items<K, V>(Dictionary<K, V> items) {
            List<Tuple<K, V>> result = new List<Tuple<K, V>>(items.Count);
            foreach (KeyValuePair<K, V> entry in items) {
                result.Add(Tuple.Create(entry.Key, entry.Value));
            }
            return result;
        }

        public static V py_dict_get<K, V>(Dictionary<K, V> items, K key) {
            V value;
            return items.TryGetValue(key, out value) ? value : default(V);
        }

        public static V py_dict_get<K, V>(Dictionary<K, V> items, K key, V fallback) {
            V value;
            return items.TryGetValue(key, out value) ? value : fallback;
        }

        public static T py_pop<T>(List<T> items) {
            if (items.Count == 0) {
                throw new IndexOutOfRangeException("pop from empty list");
            }
            return py_pop(items, items.Count - 1);
        }

        public static T py_pop<T>(List<T> items, long index) {
            int position = normalize_index(index, items.Count);
            T value = items[position];
            items.RemoveAt(position);
            return value;
        }

        public static V py_pop<K, V>(Dictionary<K, V> items, K key) {
            V value;
            if (!items.TryGetValue(key, out value)) {
                throw new KeyNotFoundException(py_repr(key));
            }
            items.Remove(key);
            return value;
        }

        public static List<T> py_sorted<T>(IEnumerable<T> items) {
            return py_sorted(items, false);
        }

        public static List<T> py_sorted<T>(IEnumerable<T> items, bool reverse) {
            Comparer<T> comparer = Comparer<T>.Create((a, b) => py_cmp((object)a, (object)b));
            IEnumerable<T> ordered = reverse ? items.OrderByDescending(item => item, comparer) : items.OrderBy(item => item, comparer);
            return ordered.ToList();
        }

        public static List<string> py_sorted(string text) {
            return py_sorted(py_iter_str(text), false);
        }

        public static List<string> py_sorted(string text, bool reverse) {
            return py_sorted(py_iter_str(text), reverse);
        }

        public static List<Tuple<long, T>> py_enumerate<T>(IEnumerable<T> items) {
            return py_enumerate(items, 0);
        }

        public static List<Tuple<long, T>> py_enumerate<T>(IEnumerable<T> items, long start) {
            List<Tuple<long, T>> result = new List<Tuple<long, T>>();
            long index = start;
            foreach (T item in items) {
                result.Add(Tuple.Create(index, item));
                index += 1;
            }
            return result;
        }

        public static List<Tuple<long, string>> py_enumerate(string text) {
            return py_enumerate(py_iter_str(text), 0);
        }

        public static List<Tuple<long, string>> py_enumerate(string text, long start) {
            return py_enumerate(py_iter_str(text), start);
        }

        public static List<T> py_list<T>(IEnumerable<T> items) {
            return new List<T>(items);
        }

        public static List<K> py_list<K, V>(Dictionary<K, V> items) {
            return new List<K>(items.Keys);
        }

        public static List<string> py_list(string text) {
            return py_iter_str(text);
        }

        public static long py_min(long a, long b) {
            return Math.Min(a, b);
        }

        public static double py_min(double a, double b) {
            return Math.Min(a, b);
        }

        public static string py_min(string a, string b) {
            return py_cmp(b, a) < 0 ? b : a;
        }

        public static object py_min(object a, object b) {
            return py_cmp(b, a) < 0 ? b : a;
        }

        public static T py_min<T>(IEnumerable<T> items) {
            return pick(items, -1, "min");
        }

        public static long py_max(long a, long b) {
            return Math.Max(a, b);
        }

        public static double py_max(double a, double b) {
            return Math.Max(a, b);
        }

        public static string py_max(string a, string b) {
            return py_cmp(b, a) > 0 ? b : a;
        }

        public static object py_max(object a, object b) {
            return py_cmp(b, a) > 0 ? b : a;
        }

        public static T py_max<T>(IEnumerable<T> items) {
            return pick(items, 1, "max");
        }

        static T pick<T>(IEnumerable<T> items, int direction, string name) {
            bool found = false;
            T best = default(T);
            foreach (T item in items) {
                if (!found || py_cmp((object)item, (object)best) * direction > 0) {
                    best = item;
                    found = true;
                }
            }
            if (!found) {
                throw new ArgumentException(name + "() arg is an empty sequence");
            }
            return best;
        }

        public static long py_sum(IEnumerable<long> items) {
            long total = 0;
            foreach (long item in items) {
                total += item;
            }
            return total;
        }

        public static long py_sum(IEnumerable<byte> items) {
            long total = 0;
            foreach (byte item in items) {
                total += item;
            }
            return total;
        }

        public static double py_sum(IEnumerable<double> items) {
            double total = 0.0;
            foreach (double item in items) {
                total += item;
            }
            return total;
        }

        // Bytes live in List<byte>.

        public static List<byte> py_bytearray() {
            return new List<byte>();
        }

        public static List<byte> py_bytearray(object source) {
            if (is_number(source)) {
                long count = to_long(source);
                if (count < 0) {
                    throw new ArgumentException("negative count");
                }
                return new List<byte>(new byte[count]);
            }
            string text = source as string;
            if (text != null) {
                return py_bytes(text);
            }
            List<byte> result = new List<byte>();
            foreach (object item in py_iter(source)) {
                result.Add(to_byte(to_long(item)));
            }
            return result;
        }

        public static List<byte> py_bytes() {
            return new List<byte>();
        }

        public static List<byte> py_bytes(List<byte> source) {
            return new List<byte>(source);
        }

        public static List<byte> py_bytes(string latin1) {
            List<byte> result = new List<byte>(latin1.Length);
            foreach (char ch in latin1) {
                result.Add(to_byte(ch));
            }
            return result;
        }

        public static List<byte> py_bytes(object source) {
            return py_bytearray(source);
        }

        public static void py_append(List<byte> items, long value) {
            items.Add(to_byte(value));
        }

        // Conversions.

        public static long py_int(long value) {
            return value;
        }

        public static long py_int(double value) {
            if (double.IsNaN(value) || double.IsInfinity(value)) {
                throw new OverflowException("cannot convert float " + float_repr(value) + " to integer");
            }
            return (long)Math.Truncate(value);
        }

        public static long py_int(bool value) {
            return value ? 1 : 0;
        }

        public static long py_int(string text) {
            return parse_int(text, 10);
        }

        public static long py_int(string text, long radix) {
            return parse_int(text, radix);
        }

        public static long py_int(object value) {
            string text = value as string;
            if (text != null) {
                return parse_int(text, 10);
            }
            if (value is bool) {
                return py_int((bool)value);
            }
            if (is_float(value)) {
                return py_int(to_double(value));
            }
            return to_long(value);
        }

        static long parse_int(string text, long radix) {
            string digits = text.Trim().Replace("_", "");
            bool negative = false;
            if (digits.StartsWith("-") || digits.StartsWith("+")) {
                negative = digits[0] == '-';
                digits = digits.Substring(1);
            }
            string lowered = digits.ToLowerInvariant();
            if ((radix == 16 && lowered.StartsWith("0x")) || (radix == 8 && lowered.StartsWith("0o")) || (radix == 2 && lowered.StartsWith("0b"))) {
                digits = digits.Substring(2);
            }
            if (digits.Length == 0 || radix < 2 || radix > 36) {
                throw new FormatException("invalid literal for int() with base " + radix + ": " + py_repr(text));
            }
            long result = 0;
            foreach (char ch in digits) {
                int digit = char.IsDigit(ch) ? ch - '0' : char.IsLetter(ch) ? char.ToLowerInvariant(ch) - 'a' + 10 : -1;
                if (digit < 0 || digit >= radix) {
                    throw new FormatException("invalid literal for int() with base " + radix + ": " + py_repr(text));
                }
                result = checked(result * radix + digit);
            }
            return negative ? -result : result;
        }

        public static double py_float(long value) {
            return value;
        }

        public static double py_float(double value) {
            return value;
        }

        public static double py_float(string text) {
            string trimmed = text.Trim().ToLowerInvariant();
            switch (trimmed) {
                case "inf":
                case "+inf":
                case "infinity":
                case "+infinity":
                    return double.PositiveInfinity;
                case "-inf":
                case "-infinity":
                    return double.NegativeInfinity;
                case "nan":
                case "+nan":
                case "-nan":
                    return double.NaN;
            }
            double value;
            if (!double.TryParse(trimmed.Replace("_", ""), NumberStyles.Float, CultureInfo.InvariantCulture, out value)) {
                throw new FormatException("could not convert string to float: " + py_repr(text));
            }
            return value;
        }

        public static double py_float(object value) {
            string text = value as string;
            if (text != null) {
                return py_float(text);
            }
            return to_double(value);
        }

        public static long py_ord(string text) {
            if (text.Length == 0 || py_len(text) != 1) {
                throw new ArgumentException("ord() expected a character, but string of length " + py_len(text) + " found");
            }
            return char.ConvertToUtf32(text, 0);
        }

        public static string py_chr(long code) {
            if (code < 0 || code > 0x10FFFF) {
                throw new ArgumentException("chr() arg not in range(0x110000)");
            }
            return char.ConvertFromUtf32((int)code);
        }

        // Strings.

        public static bool py_isdigit(string text) {
            return text.Length > 0 && text.All(char.IsDigit);
        }

        public static bool py_isalpha(string text) {
            return text.Length > 0 && text.All(char.IsLetter);
        }

        public static List<string> py_split(string text) {
            return new List<string>(text.Split((char[])null, StringSplitOptions.RemoveEmptyEntries));
        }

        public static List<string> py_split(string text, string separator) {
            if (separator == null) {
                return py_split(text);
            }
            if (separator.Length == 0) {
                throw new ArgumentException("empty separator");
            }
            return new List<string>(text.Split(new string[] { separator }, StringSplitOptions.None));
        }

        public static long py_find(string text, string needle) {
            return text.IndexOf(needle, StringComparison.Ordinal);
        }

        public static List<string> py_iter_str(string text) {
            List<string> result = new List<string>(text.Length);
            for (int i = 0; i < text.Length; i++) {
                if (char.IsSurrogatePair(text, i)) {
                    result.Add(text.Substring(i, 2));
                    i += 1;
                } else {
                    result.Add(text[i].ToString());
                }
            }
            return result;
        }

        public static List<object> py_iter(object value) {
            string text = value as string;
            if (text != null) {
                return py_iter_str(text).Cast<object>().ToList();
            }
            IDictionary dict = value as IDictionary;
            if (dict != null) {
                return dict.Keys.Cast<object>().ToList();
            }
            if (is_tuple(value)) {
                return tuple_items(value);
            }
            IEnumerable sequence = value as IEnumerable;
            if (sequence != null) {
                return sequence.Cast<object>().ToList();
            }
            throw new ArgumentException("'" + type_name(value) + "' object is not iterable");
        }

        // Printing and text conversion.

        public static void print(params object[] values) {
            print_with(" ", "\n", values);
        }

        public static void print_with(object sep, object end, params object[] values) {
            string separator = sep == null ? " " : py_str(sep);
            string terminator = end == null ? "\n" : py_str(end);
            StringBuilder line = new StringBuilder();
            for (int i = 0; i < values.Length; i++) {
                if (i > 0) {
                    line.Append(separator);
                }
                line.Append(py_str(values[i]));
            }
            line.Append(terminator);
            Console.Out.Write(line.ToString());
        }

        public static string py_str(object value) {
            if (value == null) {
                return "None";
            }
            string text = value as string;
            if (text != null) {
                return text;
            }
            if (value is bool) {
                return (bool)value ? "True" : "False";
            }
            if (is_float(value)) {
                return float_repr(to_double(value));
            }
            PyException wrapped = value as PyException;
            if (wrapped != null) {
                return py_str(wrapped.payload);
            }
            Exception error = value as Exception;
            if (error != null) {
                return error.Message;
            }
            PyObject obj = value as PyObject;
            if (obj != null) {
                return object_text(obj);
            }
            if (value is IConvertible) {
                return Convert.ToString(value, CultureInfo.InvariantCulture);
            }
            return py_repr(value);
        }

        public static string py_repr(object value) {
            if (value == null) {
                return "None";
            }
            string text = value as string;
            if (text != null) {
                return quote(text);
            }
            if (value is bool || value is IConvertible || value is Exception) {
                return py_str(value);
            }
            PyObject obj = value as PyObject;
            if (obj != null) {
                MethodInfo repr = obj.GetType().GetMethod("__repr__", Type.EmptyTypes);
                return repr != null ? py_str(repr.Invoke(obj, null)) : object_text(obj);
            }
            List<byte> bytes = value as List<byte>;
            if (bytes != null) {
                StringBuilder builder = new StringBuilder("bytearray(b'");
                foreach (byte b in bytes) {
                    if (b == '\\' || b == '\'') {
                        builder.Append('\\').Append((char)b);
                    } else if (b >= 32 && b < 127) {
                        builder.Append((char)b);
                    } else {
                        builder.Append("\\x").Append(b.ToString("x2"));
                    }
                }
                return builder.Append("')").ToString();
            }
            IDictionary dict = value as IDictionary;
            if (dict != null) {
                List<string> entries = new List<string>();
                foreach (DictionaryEntry entry in dict) {
                    entries.Add(py_repr(entry.Key) + ": " + py_repr(entry.Value));
                }
                return "{" + string.Join(", ", entries) + "}";
            }
            if (is_set(value)) {
                List<object> members = py_iter(value);
                if (members.Count == 0) {
                    return "set()";
                }
                return "{" + string.Join(", ", members.Select(py_repr)) + "}";
            }
            if (is_tuple(value)) {
                List<object> items = tuple_items(value);
                string inner = string.Join(", ", items.Select(py_repr));
                return items.Count == 1 ? "(" + inner + ",)" : "(" + inner + ")";
            }
            IEnumerable sequence = value as IEnumerable;
            if (sequence != null) {
                return "[" + string.Join(", ", sequence.Cast<object>().Select(py_repr)) + "]";
            }
            return value.ToString();
        }

        static string object_text(PyObject obj) {
            string text = obj.ToString();
            if (text == obj.GetType().ToString()) {
                return "<" + obj.GetType().Name + " object>";
            }
            return text;
        }

        static string quote(string text) {
            char delimiter = text.IndexOf('\'') >= 0 && text.IndexOf('"') < 0 ? '"' : '\'';
            StringBuilder builder = new StringBuilder();
            builder.Append(delimiter);
            foreach (char ch in text) {
                if (ch == '\\' || ch == delimiter) {
                    builder.Append('\\').Append(ch);
                } else if (ch == '\n') {
                    builder.Append("\\n");
                } else if (ch == '\r') {
                    builder.Append("\\r");
                } else if (ch == '\t') {
                    builder.Append("\\t");
                } else if (ch < ' ' || ch == '\x7f') {
                    builder.Append("\\x").Append(((int)ch).ToString("x2"));
                } else {
                    builder.Append(ch);
                }
            }
            builder.Append(delimiter);
            return builder.ToString();
        }

        static string float_repr(double value) {
            if (double.IsNaN(value)) {
                return "nan";
            }
            if (double.IsInfinity(value)) {
                return value > 0 ? "inf" : "-inf";
            }
            if (value == Math.Floor(value) && Math.Abs(value) < 1e16) {
                return value.ToString("F1", CultureInfo.InvariantCulture);
            }
            string text = value.ToString("R", CultureInfo.InvariantCulture);
            int marker = text.IndexOf('E');
            if (marker < 0) {
                return text;
            }
            return normalize_exponent(text.Substring(0, marker), text.Substring(marker + 1), false);
        }

        static string normalize_exponent(string mantissa, string exponent, bool upper) {
            int power = int.Parse(exponent, NumberStyles.Integer, CultureInfo.InvariantCulture);
            string digits = Math.Abs(power).ToString("00", CultureInfo.InvariantCulture);
            return mantissa + (upper ? "E" : "e") + (power < 0 ? "-" : "+") + digits;
        }

        // Format specifications: [[fill]align][sign][#][0][width][,][.precision][type]

        public static string py_format(object value, string spec) {
            char fill = ' ';
            char align = '\0';
            char sign = '-';
            bool alternate = false;
            bool grouping = false;
            int width = 0;
            int precision = -1;
            char kind = '\0';
            int i = 0;
            if (spec.Length >= 2 && is_align(spec[1])) {
                fill = spec[0];
                align = spec[1];
                i = 2;
            } else if (spec.Length >= 1 && is_align(spec[0])) {
                align = spec[0];
                i = 1;
            }
            if (i < spec.Length && (spec[i] == '+' || spec[i] == '-' || spec[i] == ' ')) {
                sign = spec[i];
                i += 1;
            }
            if (i < spec.Length && spec[i] == '#') {
                alternate = true;
                i += 1;
            }
            if (i < spec.Length && spec[i] == '0') {
                if (align == '\0') {
                    fill = '0';
                    align = '=';
                }
                i += 1;
            }
            while (i < spec.Length && char.IsDigit(spec[i])) {
                width = width * 10 + (spec[i] - '0');
                i += 1;
            }
            if (i < spec.Length && spec[i] == ',') {
                grouping = true;
                i += 1;
            }
            if (i < spec.Length && spec[i] == '.') {
                i += 1;
                precision = 0;
                while (i < spec.Length && char.IsDigit(spec[i])) {
                    precision = precision * 10 + (spec[i] - '0');
                    i += 1;
                }
            }
            if (i < spec.Length) {
                kind = spec[i];
                i += 1;
            }
            if (i != spec.Length) {
                throw new FormatException("Invalid format specifier '" + spec + "'");
            }

            if (!is_number(value) || kind == 's') {
                string text = py_str(value);
                if (precision >= 0 && text.Length > precision) {
                    text = text.Substring(0, precision);
                }
                return pad(text, "", fill, align == '\0' ? '<' : align, width);
            }

            string body;
            string prefix = "";
            bool negative;
            bool integral = kind == 'd' || kind == 'x' || kind == 'X' || kind == 'o' || kind == 'b' || (kind == '\0' && !is_float(value));
            if (integral) {
                long number = to_long(value);
                negative = number < 0;
                ulong magnitude = negative ? (ulong)(-(number + 1)) + 1 : (ulong)number;
                switch (kind) {
                    case 'x':
                        body = to_radix(magnitude, 16);
                        prefix = alternate ? "0x" : "";
                        break;
                    case 'X':
                        body = to_radix(magnitude, 16).ToUpperInvariant();
                        prefix = alternate ? "0X" : "";
                        break;
                    case 'o':
                        body = to_radix(magnitude, 8);
                        prefix = alternate ? "0o" : "";
                        break;
                    case 'b':
                        body = to_radix(magnitude, 2);
                        prefix = alternate ? "0b" : "";
                        break;
                    default:
                        body = magnitude.ToString(CultureInfo.InvariantCulture);
                        break;
                }
                if (grouping) {
                    body = group_digits(body);
                }
            } else {
                double number = to_double(value);
                negative = number < 0 || (number == 0.0 && 1.0 / number < 0);
                double magnitude = Math.Abs(number);
                if (kind == '%') {
                    magnitude *= 100.0;
                }
                int digits = precision < 0 ? 6 : precision;
                if (double.IsNaN(magnitude)) {
                    body = "nan";
                } else if (double.IsInfinity(magnitude)) {
                    body = "inf";
                } else {
                    switch (kind) {
                        case 'f':
                        case 'F':
                        case '%':
                            body = fixed_digits(magnitude, digits);
                            break;
                        case 'e':
                        case 'E':
                            body = exponent_digits(magnitude, digits, kind == 'E');
                            break;
                        case 'g':
                        case 'G':
                            body = general_digits(magnitude, Math.Max(digits, 1), alternate, kind == 'G');
                            break;
                        default:
                            body = precision < 0 ? float_repr(magnitude) : general_digits(magnitude, Math.Max(precision, 1), alternate, false);
                            break;
                    }
                }
                if (grouping) {
                    int end = body.IndexOfAny(new char[] { '.', 'e', 'E' });
                    body = end < 0 ? group_digits(body) : group_digits(body.Substring(0, end)) + body.Substring(end);
                }
                if (kind == 'F' || kind == 'E' || kind == 'G') {
                    body = body.ToUpperInvariant();
                }
                if (kind == '%') {
                    body += "%";
                }
            }
            string lead = negative ? "-" : sign == '+' ? "+" : sign == ' ' ? " " : "";
            return pad(body, lead + prefix, fill, align == '\0' ? '>' : align, width);
        }

        static bool is_align(char ch) {
            return ch == '<' || ch == '>' || ch == '^' || ch == '=';
        }

        static string pad(string body, string lead, char fill, char align, int width) {
            int missing = width - body.Length - lead.Length;
            if (missing <= 0) {
                return lead + body;
            }
            switch (align) {
                case '<':
                    return lead + body + new string(fill, missing);
                case '^': {
                    int left = missing / 2;
                    return new string(fill, left) + lead + body + new string(fill, missing - left);
                }
                case '=':
                    return lead + new string(fill, missing) + body;
                default:
                    return new string(fill, missing) + lead + body;
            }
        }

        static string to_radix(ulong value, int radix) {
            if (value == 0) {
                return "0";
            }
            StringBuilder builder = new StringBuilder();
            while (value > 0) {
                int digit = (int)(value % (ulong)radix);
                builder.Insert(0, (char)(digit < 10 ? '0' + digit : 'a' + digit - 10));
                value /= (ulong)radix;
            }
            return builder.ToString();
        }

        static string group_digits(string digits) {
            StringBuilder builder = new StringBuilder();
            for (int i = 0; i < digits.Length; i++) {
                if (i > 0 && (digits.Length - i) % 3 == 0) {
                    builder.Append(',');
                }
                builder.Append(digits[i]);
            }
            return builder.ToString();
        }

        static string fixed_digits(double value, int digits) {
            return value.ToString("F" + digits, CultureInfo.InvariantCulture);
        }

        static string exponent_digits(double value, int digits, bool upper) {
            string text = value.ToString("E" + digits, CultureInfo.InvariantCulture);
            int marker = text.IndexOf('E');
            return normalize_exponent(text.Substring(0, marker), text.Substring(marker + 1), upper);
        }

        static string general_digits(double value, int significant, bool alternate, bool upper) {
            if (value == 0.0) {
                return alternate ? fixed_digits(0.0, significant - 1) : "0";
            }
            string scientific = exponent_digits(value, significant - 1, upper);
            int marker = scientific.IndexOfAny(new char[] { 'e', 'E' });
            int power = int.Parse(scientific.Substring(marker + 1), NumberStyles.Integer, CultureInfo.InvariantCulture);
            if (power >= -4 && power < significant) {
                string plain = fixed_digits(value, significant - 1 - power);
                return alternate ? plain : strip_zeros(plain);
            }
            if (alternate) {
                return scientific;
            }
            return strip_zeros(scientific.Substring(0, marker)) + scientific.Substring(marker);
        }

        static string strip_zeros(string text) {
            if (text.IndexOf('.') < 0) {
                return text;
            }
            return text.TrimEnd('0').TrimEnd('.');
        }

        // Value classification.

        static bool is_number(object value) {
            return value is long || value is int || value is double || value is bool || value is byte || value is short || value is float;
        }

        static bool is_float(object value) {
            return value is double || value is float;
        }

        static long to_long(object value) {
            return Convert.ToInt64(value, CultureInfo.InvariantCulture);
        }

        static double to_double(object value) {
            return Convert.ToDouble(value, CultureInfo.InvariantCulture);
        }

        static byte to_byte(long value) {
            if (value < 0 || value > 255) {
                throw new ArgumentException("byte must be in range(0, 256)");
            }
            return (byte)value;
        }

        static bool is_set(object value) {
            if (value == null) {
                return false;
            }
            Type type = value.GetType();
            return type.IsGenericType && type.GetGenericTypeDefinition() == typeof(HashSet<>);
        }

        static bool is_tuple(object value) {
            return value != null && value.GetType().FullName.StartsWith("System.Tuple`", StringComparison.Ordinal);
        }

        static List<object> tuple_items(object value) {
            List<object> items = new List<object>();
            Type type = value.GetType();
            for (int i = 1; i <= 7; i++) {
                PropertyInfo item = type.GetProperty("Item" + i);
                if (item == null) {
                    break;
                }
                items.Add(item.GetValue(value, null));
            }
            return items;
        }

        static Type element_type(object container) {
            Type type = container.GetType();
            return type.IsGenericType ? type.GetGenericArguments()[0] : null;
        }

        static string type_name(object value) {
            if (value == null) {
                return "NoneType";
            }
            switch (py_runtime_type_id(value)) {
                case PYTRA_TID_BOOL:
                    return "bool";
                case PYTRA_TID_INT:
                    return "int";
                case PYTRA_TID_FLOAT:
                    return "float";
                case PYTRA_TID_STR:
                    return "str";
                case PYTRA_TID_LIST:
                    return "list";
                case PYTRA_TID_DICT:
                    return "dict";
                case PYTRA_TID_SET:
                    return "set";
                default:
                    return is_tuple(value) ? "tuple" : value.GetType().Name;
            }
        }
    }
}
"##;

/// Standalone runtime source, for builds that compile it once and link it.
pub fn runtime_source() -> String {
    let mut source = String::new();
    for using in USINGS.iter().filter(|using| **using != "Pyxlate.Runtime") {
        source.push_str(&format!("using {using};\n"));
    }
    source.push('\n');
    source.push_str(RUNTIME_BODY);
    source
}

/// Escapes `value` for a regular C# string literal.
pub fn escape_cs_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\0' => escaped.push_str("\\0"),
            ch if (ch as u32) > 0xFFFF => escaped.push_str(&format!("\\U{:08X}", ch as u32)),
            ch if ch.is_control() || !ch.is_ascii() => {
                escaped.push_str(&format!("\\u{:04X}", ch as u32));
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{FIRST_USER_TYPE_ID, TID_BOOL, TID_INT, TID_OBJECT, TID_SET};

    #[test]
    fn escapes_string_literals() {
        assert_eq!(escape_cs_string("plain"), "plain");
        assert_eq!(escape_cs_string("a\"b\\c"), "a\\\"b\\\\c");
        assert_eq!(escape_cs_string("line\n\ttab\r"), "line\\n\\ttab\\r");
        assert_eq!(escape_cs_string("nul\0"), "nul\\0");
        assert_eq!(escape_cs_string("\u{1b}"), "\\u001B");
        assert_eq!(escape_cs_string("é"), "\\u00E9");
        assert_eq!(escape_cs_string("🙂"), "\\U0001F642");
    }

    #[test]
    fn runtime_constants_match_the_lattice() {
        for (name, id) in [
            ("PYTRA_TID_BOOL", TID_BOOL),
            ("PYTRA_TID_INT", TID_INT),
            ("PYTRA_TID_SET", TID_SET),
            ("PYTRA_TID_OBJECT", TID_OBJECT),
        ] {
            let declaration = format!("public const long {name} = {id};");
            assert!(RUNTIME_BODY.contains(&declaration), "missing {declaration}");
        }
        assert!(RUNTIME_BODY.contains(&format!(
            "const long FIRST_USER_TYPE_ID = {FIRST_USER_TYPE_ID};"
        )));
    }

    #[test]
    fn standalone_source_imports_everything_but_itself() {
        let source = runtime_source();
        assert!(source.starts_with("using System;\n"));
        assert!(!source.contains("using Pyxlate.Runtime;"));
        assert!(source.contains("public static class py_runtime {"));
    }
}
